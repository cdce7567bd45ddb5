//! Resource records and field-path access helpers.
//!
//! A record pairs a backend-assigned identifier and revision with a JSON
//! content body. The identifier and revision belong to the backing store;
//! the gateway only rewrites content in transit.

use crate::error::{RepoError, RepoResult};
use serde_json::{Map, Value};

/// Reserved field name addressing the record identifier in query
/// projections. The identifier itself always rides on the record, never
/// inside the content body.
pub const FIELD_ID: &str = "_id";

/// A resource record as returned by the backing store.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    /// Backend-assigned identifier
    pub id: String,
    /// Opaque revision marker, assigned by the backend on every write
    pub revision: Option<String>,
    /// The content body
    pub content: Value,
}

impl ResourceRecord {
    /// Create a record without a revision marker.
    pub fn new(id: impl Into<String>, content: Value) -> Self {
        Self {
            id: id.into(),
            revision: None,
            content,
        }
    }

    /// Create a record with a revision marker.
    pub fn with_revision(
        id: impl Into<String>,
        revision: impl Into<String>,
        content: Value,
    ) -> Self {
        Self {
            id: id.into(),
            revision: Some(revision.into()),
            content,
        }
    }
}

/// Read a nested value using dot notation.
///
/// Path segments index into objects by key; a segment that parses as an
/// integer indexes into arrays (e.g. `emails.0.value`).
pub fn field_value<'a>(content: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = content;
    for part in path.split('.') {
        current = match part.parse::<usize>() {
            Ok(index) if current.is_array() => current.get(index)?,
            _ => current.get(part)?,
        };
    }
    Some(current)
}

/// Write a nested value using dot notation, creating intermediate objects
/// as needed. Fails when the path runs through a non-object value.
pub fn set_field(content: &mut Value, path: &str, value: Value) -> RepoResult<()> {
    let (parent_path, leaf) = match path.rsplit_once('.') {
        Some((prefix, leaf)) => (Some(prefix), leaf),
        None => (None, path),
    };
    let target = match parent_path {
        None => content,
        Some(prefix) => {
            let mut current = content;
            for part in prefix.split('.') {
                let object = current.as_object_mut().ok_or_else(|| bad_path(path))?;
                current = object
                    .entry(part.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
            }
            current
        }
    };
    target
        .as_object_mut()
        .ok_or_else(|| bad_path(path))?
        .insert(leaf.to_string(), value);
    Ok(())
}

/// Remove a nested value using dot notation, returning it if present.
pub fn remove_field(content: &mut Value, path: &str) -> Option<Value> {
    let (parent_path, leaf) = match path.rsplit_once('.') {
        Some((prefix, leaf)) => (Some(prefix), leaf),
        None => (None, path),
    };
    let target = match parent_path {
        None => content,
        Some(prefix) => {
            let mut current = content;
            for part in prefix.split('.') {
                current = current.get_mut(part)?;
            }
            current
        }
    };
    target.as_object_mut()?.remove(leaf)
}

fn bad_path(path: &str) -> RepoError {
    RepoError::bad_request(format!("field path '{path}' does not address an object"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_value_nested() {
        let content = json!({"name": {"given": "Ada"}, "emails": [{"value": "a@b.com"}]});
        assert_eq!(field_value(&content, "name.given"), Some(&json!("Ada")));
        assert_eq!(field_value(&content, "emails.0.value"), Some(&json!("a@b.com")));
        assert_eq!(field_value(&content, "emails.1.value"), None);
        assert_eq!(field_value(&content, "missing"), None);
    }

    #[test]
    fn test_set_field_creates_intermediates() {
        let mut content = json!({});
        set_field(&mut content, "name.given", json!("Ada")).unwrap();
        assert_eq!(content, json!({"name": {"given": "Ada"}}));
    }

    #[test]
    fn test_set_field_through_scalar_fails() {
        let mut content = json!({"name": "flat"});
        assert!(set_field(&mut content, "name.given", json!("Ada")).is_err());
    }

    #[test]
    fn test_remove_field() {
        let mut content = json!({"name": {"given": "Ada", "family": "Lovelace"}});
        assert_eq!(remove_field(&mut content, "name.family"), Some(json!("Lovelace")));
        assert_eq!(content, json!({"name": {"given": "Ada"}}));
        assert_eq!(remove_field(&mut content, "name.family"), None);
    }
}
