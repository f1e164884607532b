//! Reference resolver - builds the dependency graph between descriptors
//!
//! An edge `A -> B` means B reads an attribute of A (directly or through a
//! computed value) or explicitly depends on A. The resolver rejects
//! duplicate ids, dangling references and cycles before anything else runs.

use crate::error::{Error, Result};
use crate::resource::ResourceDescriptor;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

/// Directed acyclic graph over resource ids
///
/// Nodes are kept in declaration order; node indices double as the
/// tie-break key for deterministic ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    index: HashMap<String, usize>,
    successors: Vec<BTreeSet<usize>>,
    predecessors: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    fn with_nodes(nodes: Vec<String>, index: HashMap<String, usize>) -> Self {
        let n = nodes.len();
        Self {
            nodes,
            index,
            successors: vec![BTreeSet::new(); n],
            predecessors: vec![BTreeSet::new(); n],
        }
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        self.successors[from].insert(to);
        self.predecessors[to].insert(from);
    }

    /// Node ids in declaration order
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Declaration index of a node
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Direct dependencies of a node, in declaration order
    pub fn dependencies(&self, id: &str) -> Vec<&str> {
        self.position(id)
            .map(|i| self.names(&self.predecessors[i]))
            .unwrap_or_default()
    }

    /// Direct dependents of a node, in declaration order
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.position(id)
            .map(|i| self.names(&self.successors[i]))
            .unwrap_or_default()
    }

    /// All edges as `(from, to)`, ordered by declaration index
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.successors
            .iter()
            .enumerate()
            .flat_map(|(from, targets)| {
                targets
                    .iter()
                    .map(move |&to| (self.nodes[from].as_str(), self.nodes[to].as_str()))
            })
            .collect()
    }

    fn names(&self, set: &BTreeSet<usize>) -> Vec<&str> {
        set.iter().map(|&i| self.nodes[i].as_str()).collect()
    }

    /// Topological order (Kahn), lowest declaration index first among ready nodes
    ///
    /// Fails with `CyclicDependency` if not every node can be ordered.
    pub fn topological_order(&self) -> Result<Vec<usize>> {
        let mut remaining: Vec<usize> = self.predecessors.iter().map(BTreeSet::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for &next in &self.successors[node] {
                remaining[next] -= 1;
                if remaining[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() < self.nodes.len() {
            let cycle = self.find_cycle().unwrap_or_else(|| {
                // Unreachable for a consistent graph; report the unordered nodes.
                (0..self.nodes.len())
                    .filter(|i| !order.contains(i))
                    .map(|i| self.nodes[i].clone())
                    .collect()
            });
            return Err(Error::CyclicDependency { cycle });
        }

        Ok(order)
    }

    /// Phase of each node: 0 for roots, otherwise one more than its deepest dependency
    pub fn phases(&self, order: &[usize]) -> Vec<usize> {
        let mut phase = vec![0; self.nodes.len()];
        for &node in order {
            phase[node] = self.predecessors[node]
                .iter()
                .map(|&p| phase[p] + 1)
                .max()
                .unwrap_or(0);
        }
        phase
    }

    /// Every node reachable from `id` along edges (its transitive dependents)
    pub fn descendants(&self, id: &str) -> BTreeSet<&str> {
        let mut seen = BTreeSet::new();
        let Some(start) = self.position(id) else {
            return BTreeSet::new();
        };
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for &next in &self.successors[node] {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        seen.into_iter().map(|i| self.nodes[i].as_str()).collect()
    }

    /// Find a cycle, returned as a closed path (`a -> b -> a`)
    ///
    /// Depth-first search starting from nodes in declaration order, visiting
    /// successors in declaration order, so the reported cycle is stable.
    /// The search keeps its own stack, so chain length is not bounded by the
    /// thread's call stack.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        for start in 0..self.nodes.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }

            // Current path, each node with the successors it has yet to visit
            marks[start] = Mark::InProgress;
            let mut stack = vec![(start, self.successors[start].iter())];

            while let Some((node, successors)) = stack.last_mut() {
                let node = *node;
                let Some(&next) = successors.next() else {
                    marks[node] = Mark::Done;
                    stack.pop();
                    continue;
                };

                match marks[next] {
                    Mark::InProgress => {
                        let begin = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                        let cycle = stack[begin..]
                            .iter()
                            .map(|(n, _)| *n)
                            .chain([next])
                            .map(|i| self.nodes[i].clone())
                            .collect();
                        return Some(cycle);
                    }
                    Mark::Unvisited => {
                        marks[next] = Mark::InProgress;
                        stack.push((next, self.successors[next].iter()));
                    }
                    Mark::Done => {}
                }
            }
        }
        None
    }
}

/// Build the dependency graph for a set of descriptors
///
/// Checks, in order: duplicate ids, unknown references (first offending
/// descriptor in declaration order, first argument by name, then
/// `depends_on`), and cycles.
pub fn resolve(descriptors: &[ResourceDescriptor]) -> Result<DependencyGraph> {
    let mut index = HashMap::with_capacity(descriptors.len());
    for (i, descriptor) in descriptors.iter().enumerate() {
        if index.insert(descriptor.id.clone(), i).is_some() {
            return Err(Error::DuplicateResource(descriptor.id.clone()));
        }
    }

    let nodes = descriptors.iter().map(|d| d.id.clone()).collect();
    let mut graph = DependencyGraph::with_nodes(nodes, index);

    for (to, descriptor) in descriptors.iter().enumerate() {
        let referenced = descriptor
            .references()
            .into_iter()
            .map(|(argument, r)| (argument, r.resource.as_str()));
        let explicit = descriptor
            .depends_on
            .iter()
            .map(|id| ("depends_on", id.as_str()));

        for (argument, target) in referenced.chain(explicit) {
            let Some(from) = graph.position(target) else {
                return Err(Error::UnknownReference {
                    resource: descriptor.id.clone(),
                    argument: argument.to_string(),
                    target: target.to_string(),
                });
            };
            graph.add_edge(from, to);
        }
    }

    if let Some(cycle) = graph.find_cycle() {
        return Err(Error::CyclicDependency { cycle });
    }

    log::debug!(
        "Resolved {} resources with {} edges",
        graph.len(),
        graph.edges().len()
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceKind;
    use crate::value::ArgumentValue;

    fn topic() -> ResourceDescriptor {
        ResourceDescriptor::new("topic", ResourceKind::SnsTopic).with_arg("name", "main")
    }

    fn queue() -> ResourceDescriptor {
        ResourceDescriptor::new("queue", ResourceKind::SqsQueue).with_arg(
            "policy",
            ArgumentValue::template(
                r#"{"Condition": {"ArnEquals": {"aws:SourceArn": "{0}"}}}"#,
                vec![ArgumentValue::reference("topic", "arn")],
            ),
        )
    }

    fn function() -> ResourceDescriptor {
        ResourceDescriptor::new("function", ResourceKind::LambdaFunction)
            .with_arg("event_source", ArgumentValue::reference("queue", "arn"))
    }

    #[test]
    fn test_edges_follow_references() {
        let graph = resolve(&[topic(), queue(), function()]).unwrap();
        assert_eq!(
            graph.edges(),
            vec![("topic", "queue"), ("queue", "function")]
        );
        assert_eq!(graph.dependencies("function"), vec!["queue"]);
        assert_eq!(graph.dependents("topic"), vec!["queue"]);
    }

    #[test]
    fn test_computed_values_create_edges_to_every_input() {
        let policy = ResourceDescriptor::new("policy", ResourceKind::IamRolePolicy).with_arg(
            "policy",
            ArgumentValue::json(
                serde_json::json!({"Resource": ["{0}", "{1}"]}),
                vec![
                    ArgumentValue::reference("queue", "arn"),
                    ArgumentValue::join("/", vec![ArgumentValue::reference("topic", "arn")]),
                ],
            ),
        );
        let graph = resolve(&[topic(), queue(), policy]).unwrap();
        assert_eq!(graph.dependencies("policy"), vec!["topic", "queue"]);
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let sub = ResourceDescriptor::new("sub", ResourceKind::SnsTopicSubscription)
            .with_arg("topic", ArgumentValue::reference("topic", "arn"))
            .with_arg("topic_name", ArgumentValue::reference("topic", "name"))
            .with_dependency("topic");
        let graph = resolve(&[topic(), sub]).unwrap();
        assert_eq!(graph.edges(), vec![("topic", "sub")]);
    }

    #[test]
    fn test_unknown_reference() {
        let err = resolve(&[function()]).unwrap_err();
        match err {
            Error::UnknownReference {
                resource,
                argument,
                target,
            } => {
                assert_eq!(resource, "function");
                assert_eq!(argument, "event_source");
                assert_eq!(target, "queue");
            }
            other => panic!("expected UnknownReference, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_explicit_dependency() {
        let lonely = topic().with_dependency("ghost");
        let err = resolve(&[lonely]).unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownReference { ref argument, ref target, .. }
                if argument == "depends_on" && target == "ghost"
        ));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = resolve(&[topic(), topic()]).unwrap_err();
        assert!(matches!(err, Error::DuplicateResource(id) if id == "topic"));
    }

    #[test]
    fn test_two_node_cycle_names_both() {
        let a = ResourceDescriptor::new("A", ResourceKind::Custom("thing".into()))
            .with_arg("input", ArgumentValue::reference("B", "out"));
        let b = ResourceDescriptor::new("B", ResourceKind::Custom("thing".into()))
            .with_arg("input", ArgumentValue::reference("A", "out"));

        match resolve(&[a, b]).unwrap_err() {
            Error::CyclicDependency { cycle } => assert_eq!(cycle, vec!["A", "B", "A"]),
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let a = ResourceDescriptor::new("A", ResourceKind::SqsQueue)
            .with_arg("redrive", ArgumentValue::reference("A", "arn"));
        match resolve(&[a]).unwrap_err() {
            Error::CyclicDependency { cycle } => assert_eq!(cycle, vec!["A", "A"]),
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_longer_cycle_reports_only_cycle_members() {
        let root = ResourceDescriptor::new("root", ResourceKind::KmsKey);
        let a = ResourceDescriptor::new("a", ResourceKind::SqsQueue)
            .with_arg("x", ArgumentValue::reference("root", "arn"))
            .with_arg("y", ArgumentValue::reference("c", "arn"));
        let b = ResourceDescriptor::new("b", ResourceKind::SqsQueue)
            .with_arg("x", ArgumentValue::reference("a", "arn"));
        let c = ResourceDescriptor::new("c", ResourceKind::SqsQueue)
            .with_arg("x", ArgumentValue::reference("b", "arn"));

        match resolve(&[root, a, b, c]).unwrap_err() {
            Error::CyclicDependency { cycle } => assert_eq!(cycle, vec!["a", "b", "c", "a"]),
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_reference_reported_before_cycle() {
        let a = ResourceDescriptor::new("A", ResourceKind::SqsQueue)
            .with_arg("x", ArgumentValue::reference("B", "out"));
        let b = ResourceDescriptor::new("B", ResourceKind::SqsQueue)
            .with_arg("x", ArgumentValue::reference("A", "out"))
            .with_arg("y", ArgumentValue::reference("missing", "out"));
        assert!(matches!(
            resolve(&[a, b]).unwrap_err(),
            Error::UnknownReference { .. }
        ));
    }

    #[test]
    fn test_topological_order_breaks_ties_by_declaration() {
        let independent = ResourceDescriptor::new("email", ResourceKind::SnsTopicSubscription);
        // function is declared first but depends on queue, declared last
        let graph = resolve(&[function(), topic(), independent, queue()]).unwrap();
        let order: Vec<&str> = graph
            .topological_order()
            .unwrap()
            .into_iter()
            .map(|i| graph.nodes()[i].as_str())
            .collect();
        assert_eq!(order, vec!["topic", "email", "queue", "function"]);
    }

    #[test]
    fn test_phases_use_longest_path() {
        let shortcut = ResourceDescriptor::new("sub", ResourceKind::SnsTopicSubscription)
            .with_arg("topic", ArgumentValue::reference("topic", "arn"))
            .with_arg("endpoint", ArgumentValue::reference("function", "arn"));
        let graph = resolve(&[topic(), queue(), function(), shortcut]).unwrap();
        let order = graph.topological_order().unwrap();
        assert_eq!(graph.phases(&order), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_descendants_are_transitive() {
        let graph = resolve(&[topic(), queue(), function()]).unwrap();
        let down: Vec<&str> = graph.descendants("topic").into_iter().collect();
        assert_eq!(down, vec!["function", "queue"]);
        assert!(graph.descendants("function").is_empty());
    }

    fn chain(length: usize) -> Vec<ResourceDescriptor> {
        (0..length)
            .map(|i| {
                let descriptor = ResourceDescriptor::new(format!("r{i}"), ResourceKind::SqsQueue);
                if i == 0 {
                    descriptor
                } else {
                    descriptor
                        .with_arg("upstream", ArgumentValue::reference(format!("r{}", i - 1), "arn"))
                }
            })
            .collect()
    }

    #[test]
    fn test_long_chain_resolves() {
        let graph = resolve(&chain(50_000)).unwrap();
        let order = graph.topological_order().unwrap();
        assert_eq!(order.len(), 50_000);
        assert_eq!(graph.nodes()[order[49_999]], "r49999");
        assert_eq!(graph.phases(&order)[49_999], 49_999);
    }

    #[test]
    fn test_cycle_at_end_of_long_chain() {
        let mut descriptors = chain(50_000);
        descriptors[0] = descriptors[0]
            .clone()
            .with_arg("loop", ArgumentValue::reference("r49999", "arn"));

        match resolve(&descriptors).unwrap_err() {
            Error::CyclicDependency { cycle } => {
                assert_eq!(cycle.len(), 50_001);
                assert_eq!(cycle.first(), cycle.last());
            }
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }
}
