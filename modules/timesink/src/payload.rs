//! Event payload access
//!
//! Payloads are arbitrary JSON. Everything the store needs from them is read
//! through dotted field paths (`metadata.name`, `metadata.ownerReferences.0.kind`)
//! that fail with a typed error instead of panicking on an unexpected shape.

use serde_json::Value;
use thiserror::Error;

use crate::identity::ObjectIdentity;

pub const API_VERSION_PATH: &str = "apiVersion";
pub const KIND_PATH: &str = "kind";
pub const NAME_PATH: &str = "metadata.name";
pub const UID_PATH: &str = "metadata.uid";
pub const OWNER_REFERENCES_PATH: &str = "metadata.ownerReferences";

/// Errors from field-path lookups
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("missing field '{path}'")]
    Missing { path: String },

    #[error("field '{path}' is not a {expected}")]
    WrongType { path: String, expected: &'static str },
}

/// Structured event payload (the CloudEvent `data` attribute)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Payload(Value);

impl Payload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Look up a dotted path. Numeric segments index into arrays.
    ///
    /// A JSON `null` at the end of the path counts as missing.
    pub fn get(&self, path: &str) -> Result<&Value, FieldError> {
        let mut current = &self.0;

        for segment in path.split('.') {
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            current = next.ok_or_else(|| FieldError::Missing {
                path: path.to_string(),
            })?;
        }

        if current.is_null() {
            return Err(FieldError::Missing {
                path: path.to_string(),
            });
        }
        Ok(current)
    }

    pub fn get_str(&self, path: &str) -> Result<&str, FieldError> {
        self.get(path)?.as_str().ok_or_else(|| FieldError::WrongType {
            path: path.to_string(),
            expected: "string",
        })
    }

    pub fn get_array(&self, path: &str) -> Result<&Vec<Value>, FieldError> {
        self.get(path)?.as_array().ok_or_else(|| FieldError::WrongType {
            path: path.to_string(),
            expected: "list",
        })
    }

    /// Lenient string lookup for filtering: absent and mistyped both read as `None`
    pub fn opt_str(&self, path: &str) -> Option<&str> {
        self.get_str(path).ok()
    }

    /// The (apiVersion, kind, name) triple of the object this payload describes
    pub fn identity(&self) -> Result<ObjectIdentity, FieldError> {
        Ok(ObjectIdentity::new(
            self.get_str(API_VERSION_PATH)?,
            self.get_str(KIND_PATH)?,
            self.get_str(NAME_PATH)?,
        ))
    }

    pub fn uid(&self) -> Option<&str> {
        self.opt_str(UID_PATH)
    }

    /// Declared owners, in declaration order
    ///
    /// A payload without `ownerReferences` has no owners. Entries lacking any of
    /// the three identity fields cannot be resolved and are skipped.
    pub fn owner_references(&self) -> Vec<ObjectIdentity> {
        let refs = match self.get_array(OWNER_REFERENCES_PATH) {
            Ok(refs) => refs,
            Err(FieldError::Missing { .. }) => return Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed ownerReferences");
                return Vec::new();
            }
        };

        refs.iter()
            .enumerate()
            .filter_map(|(idx, entry)| {
                let field = |name: &str| entry.get(name).and_then(Value::as_str);
                match (field("apiVersion"), field("kind"), field("name")) {
                    (Some(api_version), Some(kind), Some(name)) => {
                        Some(ObjectIdentity::new(api_version, kind, name))
                    }
                    _ => {
                        tracing::warn!(index = idx, "skipping incomplete owner reference");
                        None
                    }
                }
            })
            .collect()
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod() -> Payload {
        Payload::new(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "p1",
                "uid": "uid-p1",
                "labels": null,
                "ownerReferences": [
                    {"apiVersion": "apps/v1", "kind": "ReplicaSet", "name": "rs1"},
                    {"apiVersion": "v1", "kind": "Node"},
                    {"apiVersion": "batch/v1", "kind": "Job", "name": "j1"}
                ]
            }
        }))
    }

    #[test]
    fn test_dotted_paths() {
        let payload = pod();
        assert_eq!(payload.get_str("metadata.name"), Ok("p1"));
        assert_eq!(
            payload.get_str("metadata.ownerReferences.2.name"),
            Ok("j1")
        );
        assert_eq!(payload.uid(), Some("uid-p1"));
    }

    #[test]
    fn test_missing_and_mistyped_fields() {
        let payload = pod();
        assert_eq!(
            payload.get("metadata.namespace"),
            Err(FieldError::Missing {
                path: "metadata.namespace".to_string()
            })
        );
        assert!(matches!(
            payload.get("metadata.labels"),
            Err(FieldError::Missing { .. })
        ));
        assert!(matches!(
            payload.get_str("metadata"),
            Err(FieldError::WrongType { expected: "string", .. })
        ));
        assert!(payload.get("apiVersion.deeper").is_err());
    }

    #[test]
    fn test_identity() {
        assert_eq!(
            pod().identity().unwrap(),
            ObjectIdentity::new("v1", "Pod", "p1")
        );
        assert!(Payload::new(json!({"kind": "Pod"})).identity().is_err());
    }

    #[test]
    fn test_owner_references_skip_incomplete_entries() {
        let owners = pod().owner_references();
        assert_eq!(
            owners,
            vec![
                ObjectIdentity::new("apps/v1", "ReplicaSet", "rs1"),
                ObjectIdentity::new("batch/v1", "Job", "j1"),
            ]
        );
    }

    #[test]
    fn test_no_owner_references() {
        assert!(Payload::new(json!({"metadata": {}})).owner_references().is_empty());
        assert!(Payload::new(json!("scalar payload")).owner_references().is_empty());
        assert!(Payload::default().owner_references().is_empty());
    }
}
