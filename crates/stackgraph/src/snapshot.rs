//! Prior state: what an earlier apply realized

use crate::types::ResourceKind;
use crate::value::{AttributeStore, Attributes};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A resource as it was realized by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealizedResource {
    pub kind: ResourceKind,
    /// Fingerprint of the descriptor that produced this resource
    pub fingerprint: String,
    #[serde(default)]
    pub attributes: Attributes,
    /// Resolved argument values sent to the provider
    #[serde(default)]
    pub arguments: BTreeMap<String, Value>,
    /// Realization order; deletions run in reverse
    pub sequence: u64,
}

/// Snapshot of realized resources, keyed by id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub resources: BTreeMap<String, RealizedResource>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&RealizedResource> {
        self.resources.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    fn next_sequence(&self) -> u64 {
        self.resources
            .values()
            .map(|r| r.sequence + 1)
            .max()
            .unwrap_or(0)
    }

    /// Record a realized resource
    ///
    /// An update keeps the original sequence number so deletion order stays
    /// tied to when the resource first appeared.
    pub fn record(
        &mut self,
        id: &str,
        kind: ResourceKind,
        fingerprint: String,
        arguments: BTreeMap<String, Value>,
        attributes: Attributes,
    ) {
        let sequence = self
            .resources
            .get(id)
            .map_or_else(|| self.next_sequence(), |existing| existing.sequence);

        self.resources.insert(
            id.to_string(),
            RealizedResource {
                kind,
                fingerprint,
                attributes,
                arguments,
                sequence,
            },
        );
    }

    pub fn remove(&mut self, id: &str) -> Option<RealizedResource> {
        self.resources.remove(id)
    }

    /// Ids ordered by descending realization sequence
    pub fn reverse_realization_order(&self) -> Vec<&str> {
        let mut ids: Vec<(&str, u64)> = self
            .resources
            .iter()
            .map(|(id, r)| (id.as_str(), r.sequence))
            .collect();
        ids.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ids.into_iter().map(|(id, _)| id).collect()
    }

    /// Attribute store seeded with every realized attribute
    pub fn attribute_store(&self) -> AttributeStore {
        let mut store = AttributeStore::new();
        for (id, resource) in &self.resources {
            store.insert(id.clone(), resource.attributes.clone());
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(arn: &str) -> Attributes {
        Attributes::from([("arn".to_string(), Value::from(arn))])
    }

    #[test]
    fn test_record_assigns_increasing_sequence() {
        let mut snapshot = Snapshot::new();
        snapshot.record("a", ResourceKind::KmsKey, "f1".into(), BTreeMap::new(), attrs("a"));
        snapshot.record("b", ResourceKind::SnsTopic, "f2".into(), BTreeMap::new(), attrs("b"));
        assert_eq!(snapshot.get("a").unwrap().sequence, 0);
        assert_eq!(snapshot.get("b").unwrap().sequence, 1);
        assert_eq!(snapshot.reverse_realization_order(), vec!["b", "a"]);
    }

    #[test]
    fn test_update_keeps_sequence() {
        let mut snapshot = Snapshot::new();
        snapshot.record("a", ResourceKind::KmsKey, "f1".into(), BTreeMap::new(), attrs("a"));
        snapshot.record("b", ResourceKind::SnsTopic, "f2".into(), BTreeMap::new(), attrs("b"));
        snapshot.record("a", ResourceKind::KmsKey, "f3".into(), BTreeMap::new(), attrs("a2"));

        let a = snapshot.get("a").unwrap();
        assert_eq!(a.sequence, 0);
        assert_eq!(a.fingerprint, "f3");
    }

    #[test]
    fn test_attribute_store_exposes_realized_attributes() {
        let mut snapshot = Snapshot::new();
        snapshot.record(
            "topic",
            ResourceKind::SnsTopic,
            "f".into(),
            BTreeMap::new(),
            attrs("arn:topic"),
        );
        let store = snapshot.attribute_store();
        let r = crate::value::AttributeRef::new("topic", "arn");
        assert_eq!(store.get(&r), Some(&Value::from("arn:topic")));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let mut snapshot = Snapshot::new();
        snapshot.record("q", ResourceKind::SqsQueue, "f".into(), BTreeMap::new(), attrs("arn:q"));
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["resources"]["q"]["kind"], "sqs_queue");
        let back: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }
}
