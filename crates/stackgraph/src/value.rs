//! Argument values: literals, references to future attributes, and values
//! computed from other values once those attributes are known.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Realized attributes of a single resource
pub type Attributes = BTreeMap<String, Value>;

/// Reference to an attribute another resource exposes once realized
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeRef {
    pub resource: String,
    pub attribute: String,
}

impl AttributeRef {
    pub fn new(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

impl FromStr for AttributeRef {
    type Err = String;

    /// Parse `resource.attribute`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((resource, attribute)) if !resource.is_empty() && !attribute.is_empty() => {
                Ok(Self::new(resource, attribute))
            }
            _ => Err(format!("invalid reference '{s}', expected 'resource.attribute'")),
        }
    }
}

/// Function signature for host-language transforms
pub type TransformFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// A named in-process transform
#[derive(Clone)]
pub struct CustomTransform {
    name: String,
    func: Arc<TransformFn>,
}

impl CustomTransform {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CustomTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomTransform")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// Closures cannot be compared; two custom transforms are the same if they
// carry the same name.
impl PartialEq for CustomTransform {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// How a computed value is derived from its resolved inputs
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    /// String with `{0}`, `{1}`, ... placeholders
    Template(String),
    /// JSON document whose string leaves are templates, rendered to its
    /// compact string encoding (policy documents)
    Json(Value),
    /// Same as `Json` but the structured value is kept
    Document(Value),
    /// Stringified inputs joined with a separator
    Join(String),
    /// Host-language closure
    Custom(CustomTransform),
}

impl Transform {
    /// Short name for display and error messages
    pub fn name(&self) -> &str {
        match self {
            Self::Template(_) => "template",
            Self::Json(_) => "json",
            Self::Document(_) => "document",
            Self::Join(_) => "join",
            Self::Custom(custom) => custom.name(),
        }
    }

    /// Apply the transform to fully resolved inputs
    pub fn apply(&self, inputs: &[Value]) -> Result<Value> {
        match self {
            Self::Template(template) => Ok(Value::String(self.render(template, inputs)?)),
            Self::Json(document) => {
                let rendered = self.fill_document(document, inputs)?;
                Ok(Value::String(serde_json::to_string(&rendered)?))
            }
            Self::Document(document) => self.fill_document(document, inputs),
            Self::Join(separator) => Ok(Value::String(
                inputs
                    .iter()
                    .map(value_to_text)
                    .collect::<Vec<_>>()
                    .join(separator),
            )),
            Self::Custom(custom) => (custom.func)(inputs),
        }
    }

    fn fill_document(&self, document: &Value, inputs: &[Value]) -> Result<Value> {
        match document {
            Value::String(s) => {
                if let Some(index) = whole_placeholder(s) {
                    return self.input_at(inputs, index).cloned();
                }
                Ok(Value::String(self.render(s, inputs)?))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.fill_document(item, inputs))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut filled = Map::with_capacity(map.len());
                for (key, value) in map {
                    filled.insert(key.clone(), self.fill_document(value, inputs)?);
                }
                Ok(Value::Object(filled))
            }
            other => Ok(other.clone()),
        }
    }

    /// Replace `{n}` placeholders; any other brace is kept as-is so JSON
    /// text can be used as a template.
    fn render(&self, template: &str, inputs: &[Value]) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let digits = after.chars().take_while(char::is_ascii_digit).count();

            if digits > 0 && after[digits..].starts_with('}') {
                let index: usize = after[..digits].parse().map_err(|_| Error::Transform {
                    transform: self.name().to_string(),
                    message: format!("invalid placeholder '{{{}}}'", &after[..digits]),
                })?;
                out.push_str(&value_to_text(self.input_at(inputs, index)?));
                rest = &after[digits + 1..];
            } else {
                out.push('{');
                rest = after;
            }
        }

        out.push_str(rest);
        Ok(out)
    }

    fn input_at<'a>(&self, inputs: &'a [Value], index: usize) -> Result<&'a Value> {
        inputs.get(index).ok_or_else(|| Error::Transform {
            transform: self.name().to_string(),
            message: format!(
                "placeholder {{{index}}} out of range ({} inputs)",
                inputs.len()
            ),
        })
    }
}

/// Parse a string that is exactly one placeholder, e.g. `{1}`
fn whole_placeholder(s: &str) -> Option<usize> {
    let digits = s.strip_prefix('{')?.strip_suffix('}')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Strings are inserted raw, everything else as compact JSON
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A value computed from other argument values
#[derive(Debug, Clone, PartialEq)]
pub struct Computed {
    pub inputs: Vec<ArgumentValue>,
    pub transform: Transform,
}

/// Value of a single resource argument
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    /// Known at declaration time
    Literal(Value),
    /// Attribute of another resource, known only after it is realized
    Reference(AttributeRef),
    /// Derived from other values once they are all known
    Computed(Computed),
}

impl ArgumentValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn reference(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::Reference(AttributeRef::new(resource, attribute))
    }

    pub fn computed(transform: Transform, inputs: Vec<ArgumentValue>) -> Self {
        Self::Computed(Computed { inputs, transform })
    }

    pub fn template(template: impl Into<String>, inputs: Vec<ArgumentValue>) -> Self {
        Self::computed(Transform::Template(template.into()), inputs)
    }

    /// JSON document rendered to a string, e.g. an IAM policy
    pub fn json(document: Value, inputs: Vec<ArgumentValue>) -> Self {
        Self::computed(Transform::Json(document), inputs)
    }

    /// JSON document kept as a structured value
    pub fn document(document: Value, inputs: Vec<ArgumentValue>) -> Self {
        Self::computed(Transform::Document(document), inputs)
    }

    pub fn join(separator: impl Into<String>, inputs: Vec<ArgumentValue>) -> Self {
        Self::computed(Transform::Join(separator.into()), inputs)
    }

    pub fn custom<F>(name: impl Into<String>, inputs: Vec<ArgumentValue>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self::computed(Transform::Custom(CustomTransform::new(name, func)), inputs)
    }

    /// Every attribute reference in this value, recursing into computed inputs
    pub fn references(&self) -> Vec<&AttributeRef> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a AttributeRef>) {
        match self {
            Self::Literal(_) => {}
            Self::Reference(r) => out.push(r),
            Self::Computed(computed) => {
                for input in &computed.inputs {
                    input.collect_references(out);
                }
            }
        }
    }

    /// Check if the value is known without any realized attribute
    pub fn is_known(&self) -> bool {
        self.references().is_empty()
    }

    /// Resolve to a concrete value using realized attributes
    pub fn resolve(&self, store: &AttributeStore) -> Result<Value> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Reference(r) => store.get(r).cloned().ok_or_else(|| Error::UnresolvedAttribute {
                resource: r.resource.clone(),
                attribute: r.attribute.clone(),
            }),
            Self::Computed(computed) => {
                let inputs = computed
                    .inputs
                    .iter()
                    .map(|input| input.resolve(store))
                    .collect::<Result<Vec<_>>>()?;
                computed.transform.apply(&inputs)
            }
        }
    }

    /// Resolve what can be resolved, keep the rest symbolic
    ///
    /// Used to preview arguments before execution; unknown references are
    /// shown as `${resource.attribute}`.
    pub fn preview(&self, store: &AttributeStore) -> Value {
        match self.resolve(store) {
            Ok(value) => value,
            Err(_) => match self {
                Self::Reference(r) => Value::String(format!("${{{r}}}")),
                _ => Value::String(self.to_string()),
            },
        }
    }

    /// Unambiguous JSON form used for fingerprints and plan output
    ///
    /// Literal objects with `$`-prefixed keys are wrapped in `{"$lit": ...}`
    /// so they can't collide with the reference and computed forms.
    pub fn canonical(&self) -> Value {
        match self {
            Self::Literal(value @ Value::Object(map)) if map.keys().any(|k| k.starts_with('$')) => {
                json!({ "$lit": value })
            }
            Self::Literal(value) => value.clone(),
            Self::Reference(r) => json!({ "$ref": r.to_string() }),
            Self::Computed(computed) => {
                let spec = match &computed.transform {
                    Transform::Template(template) => json!({ "template": template }),
                    Transform::Json(document) => json!({ "json": document }),
                    Transform::Document(document) => json!({ "document": document }),
                    Transform::Join(separator) => json!({ "join": separator }),
                    Transform::Custom(custom) => json!({ "custom": custom.name() }),
                };
                let inputs: Vec<Value> = computed.inputs.iter().map(Self::canonical).collect();
                json!({ "$computed": spec, "inputs": inputs })
            }
        }
    }
}

impl fmt::Display for ArgumentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "{value}"),
            Self::Reference(r) => write!(f, "${{{r}}}"),
            Self::Computed(computed) => {
                write!(f, "{}(", computed.transform.name())?;
                for (i, input) in computed.inputs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{input}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl From<&str> for ArgumentValue {
    fn from(value: &str) -> Self {
        Self::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for ArgumentValue {
    fn from(value: String) -> Self {
        Self::Literal(Value::String(value))
    }
}

impl From<i64> for ArgumentValue {
    fn from(value: i64) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<u64> for ArgumentValue {
    fn from(value: u64) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<bool> for ArgumentValue {
    fn from(value: bool) -> Self {
        Self::Literal(Value::Bool(value))
    }
}

impl From<Value> for ArgumentValue {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<AttributeRef> for ArgumentValue {
    fn from(value: AttributeRef) -> Self {
        Self::Reference(value)
    }
}

/// Attributes realized so far, keyed by resource id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeStore {
    resources: BTreeMap<String, Attributes>,
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the attributes of a realized resource
    pub fn insert(&mut self, resource: impl Into<String>, attributes: Attributes) {
        self.resources.insert(resource.into(), attributes);
    }

    pub fn remove(&mut self, resource: &str) -> Option<Attributes> {
        self.resources.remove(resource)
    }

    pub fn get(&self, reference: &AttributeRef) -> Option<&Value> {
        self.resources
            .get(&reference.resource)?
            .get(&reference.attribute)
    }

    pub fn resource(&self, resource: &str) -> Option<&Attributes> {
        self.resources.get(resource)
    }

    pub fn contains(&self, resource: &str) -> bool {
        self.resources.contains_key(resource)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(resource: &str, attribute: &str, value: &str) -> AttributeStore {
        let mut store = AttributeStore::new();
        store.insert(
            resource,
            Attributes::from([(attribute.to_string(), Value::from(value))]),
        );
        store
    }

    #[test]
    fn test_parse_attribute_ref() {
        let r: AttributeRef = "queue.arn".parse().unwrap();
        assert_eq!(r, AttributeRef::new("queue", "arn"));
        assert!("queue".parse::<AttributeRef>().is_err());
        assert!(".arn".parse::<AttributeRef>().is_err());
        assert!("queue.".parse::<AttributeRef>().is_err());
    }

    #[test]
    fn test_references_recurse_into_computed_inputs() {
        let value = ArgumentValue::template(
            "{0}/{1}",
            vec![
                ArgumentValue::reference("a", "arn"),
                ArgumentValue::join(
                    ",",
                    vec![
                        ArgumentValue::literal("x"),
                        ArgumentValue::reference("b", "url"),
                    ],
                ),
            ],
        );
        let refs: Vec<String> = value.references().iter().map(ToString::to_string).collect();
        assert_eq!(refs, vec!["a.arn", "b.url"]);
        assert!(!value.is_known());
        assert!(ArgumentValue::literal(3).is_known());
    }

    #[test]
    fn test_reference_resolution_requires_realized_attribute() {
        let value = ArgumentValue::reference("topic", "arn");
        let err = value.resolve(&AttributeStore::new()).unwrap_err();
        assert!(matches!(err, Error::UnresolvedAttribute { .. }));

        let store = store_with("topic", "arn", "arn:aws:sns:topic");
        assert_eq!(value.resolve(&store).unwrap(), Value::from("arn:aws:sns:topic"));
    }

    #[test]
    fn test_template_keeps_json_braces() {
        let value = ArgumentValue::template(
            r#"{"Resource": "{0}", "Count": {1}}"#,
            vec![ArgumentValue::reference("q", "arn"), ArgumentValue::literal(10)],
        );
        let store = store_with("q", "arn", "arn:q");
        assert_eq!(
            value.resolve(&store).unwrap(),
            Value::from(r#"{"Resource": "arn:q", "Count": 10}"#)
        );
    }

    #[test]
    fn test_template_placeholder_out_of_range() {
        let err = Transform::Template("{2}".into())
            .apply(&[Value::from("only")])
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_json_transform_renders_policy_string() {
        let value = ArgumentValue::json(
            json!({
                "deadLetterTargetArn": "{0}",
                "maxReceiveCount": 10,
            }),
            vec![ArgumentValue::reference("dlq", "arn")],
        );
        let store = store_with("dlq", "arn", "arn:dlq");
        let rendered = value.resolve(&store).unwrap();
        let parsed: Value = serde_json::from_str(rendered.as_str().unwrap()).unwrap();
        assert_eq!(
            parsed,
            json!({"deadLetterTargetArn": "arn:dlq", "maxReceiveCount": 10})
        );
    }

    #[test]
    fn test_document_whole_placeholder_keeps_type() {
        let transform = Transform::Document(json!({"count": "{0}", "label": "n={0}"}));
        let out = transform.apply(&[json!(7)]).unwrap();
        assert_eq!(out, json!({"count": 7, "label": "n=7"}));
    }

    #[test]
    fn test_custom_transform() {
        let value = ArgumentValue::custom(
            "upper",
            vec![ArgumentValue::literal("abc")],
            |inputs| Ok(Value::from(value_to_text(&inputs[0]).to_uppercase())),
        );
        assert_eq!(value.resolve(&AttributeStore::new()).unwrap(), Value::from("ABC"));
        assert_eq!(value.to_string(), "upper(\"abc\")");
    }

    #[test]
    fn test_preview_keeps_unknown_references_symbolic() {
        let store = store_with("topic", "arn", "arn:t");
        assert_eq!(
            ArgumentValue::reference("queue", "arn").preview(&store),
            Value::from("${queue.arn}")
        );
        assert_eq!(
            ArgumentValue::reference("topic", "arn").preview(&store),
            Value::from("arn:t")
        );
    }

    #[test]
    fn test_canonical_distinguishes_references() {
        assert_eq!(
            ArgumentValue::reference("a", "b").canonical(),
            json!({"$ref": "a.b"})
        );
        assert_eq!(ArgumentValue::literal("a.b").canonical(), json!("a.b"));
    }

    #[test]
    fn test_canonical_tags_literals_that_look_like_references() {
        let lookalike = ArgumentValue::literal(json!({"$ref": "a.b"}));
        assert_ne!(
            lookalike.canonical(),
            ArgumentValue::reference("a", "b").canonical()
        );
        assert_eq!(lookalike.canonical(), json!({"$lit": {"$ref": "a.b"}}));
        assert_eq!(
            ArgumentValue::literal(json!({"name": "q"})).canonical(),
            json!({"name": "q"})
        );
    }

    #[test]
    fn test_signed_placeholder_is_a_literal() {
        let transform = Transform::Document(json!({"a": "{+0}", "b": "{0}", "c": "{}"}));
        let out = transform.apply(&[json!(7)]).unwrap();
        assert_eq!(out, json!({"a": "{+0}", "b": 7, "c": "{}"}));

        let template = Transform::Template("{+0}".to_string());
        assert_eq!(template.apply(&[json!(7)]).unwrap(), json!("{+0}"));
    }
}
