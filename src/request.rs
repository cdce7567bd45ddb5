//! Request types and execution contexts for gateway operations.

use crate::filter::Filter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Execution context accompanying every call.
///
/// Carries a request id for logging and tracing, and distinguishes the
/// caller's identity from the unrestricted internal identity used for
/// administrative sub-operations (bulk command queries and deletes,
/// uniqueness lookups).
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique identifier for this request
    pub request_id: String,
    internal: bool,
}

impl RequestContext {
    /// Create a context with a specific request ID.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            internal: false,
        }
    }

    /// Create a context with a generated request ID.
    pub fn with_generated_id() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// Create an internal context for administrative sub-operations.
    pub fn internal() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            internal: true,
        }
    }

    /// Whether this context carries the internal identity.
    pub fn is_internal(&self) -> bool {
        self.internal
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::with_generated_id()
    }
}

/// A query against one resource type.
///
/// Either names a configured query via `query_id` (resolved by the query
/// normalizer before the backend sees it) or carries a concrete `filter`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    /// Reference to a configured named query
    pub query_id: Option<String>,
    /// Concrete filter, in parsed form
    pub filter: Option<Filter>,
    /// Sort keys, applied in order
    pub sort_keys: Vec<SortKey>,
    /// Field projection; empty means the full content body
    pub fields: Vec<String>,
    /// Named parameters, consumed by token substitution
    pub additional_parameters: HashMap<String, String>,
}

impl QueryRequest {
    /// Create an empty query matching every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Name a configured query.
    pub fn with_query_id(mut self, query_id: impl Into<String>) -> Self {
        self.query_id = Some(query_id.into());
        self
    }

    /// Set a concrete filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Append a sort key.
    pub fn with_sort_key(mut self, sort_key: SortKey) -> Self {
        self.sort_keys.push(sort_key);
        self
    }

    /// Append a projected field.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    /// Add an additional named parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_parameters.insert(name.into(), value.into());
        self
    }
}

/// A named action against one resource type.
#[derive(Debug, Clone, Default)]
pub struct ActionRequest {
    /// The action name
    pub action: String,
    /// Named parameters (e.g. `commandId` for the bulk-command action)
    pub additional_parameters: HashMap<String, String>,
    /// Optional request payload
    pub content: Option<Value>,
}

impl ActionRequest {
    /// Create an action request with the given action name.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    /// Add an additional named parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_parameters.insert(name.into(), value.into());
        self
    }

    /// Attach a request payload.
    pub fn with_content(mut self, content: Value) -> Self {
        self.content = Some(content);
        self
    }
}

/// A single sort key: field path plus direction.
///
/// String encoding: `name` or `+name` sorts ascending, `-name` descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub ascending: bool,
}

impl SortKey {
    /// Ascending sort on a field.
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    /// Descending sort on a field.
    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }
}

/// Error parsing a sort key from its string encoding.
#[derive(Debug, Error)]
#[error("invalid sort key '{input}'")]
pub struct SortKeyParseError {
    input: String,
}

impl FromStr for SortKey {
    type Err = SortKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (field, ascending) = match trimmed.strip_prefix('-') {
            Some(rest) => (rest, false),
            None => (trimmed.strip_prefix('+').unwrap_or(trimmed), true),
        };
        if field.is_empty() {
            return Err(SortKeyParseError {
                input: s.to_string(),
            });
        }
        Ok(Self {
            field: field.to_string(),
            ascending,
        })
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ascending {
            write!(f, "{}", self.field)
        } else {
            write!(f, "-{}", self.field)
        }
    }
}

/// One step of a partial update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    /// The operation kind
    #[serde(rename = "operation")]
    pub kind: PatchOpKind,
    /// The field path the operation addresses
    #[serde(rename = "field")]
    pub path: String,
    /// The value, required for add and replace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Patch operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOpKind {
    Add,
    Replace,
    Remove,
}

impl fmt::Display for PatchOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PatchOpKind::Add => "add",
            PatchOpKind::Replace => "replace",
            PatchOpKind::Remove => "remove",
        };
        write!(f, "{name}")
    }
}

impl PatchOperation {
    /// Add a value at a field path.
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            kind: PatchOpKind::Add,
            path: path.into(),
            value: Some(value),
        }
    }

    /// Replace the value at a field path.
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            kind: PatchOpKind::Replace,
            path: path.into(),
            value: Some(value),
        }
    }

    /// Remove the value at a field path.
    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            kind: PatchOpKind::Remove,
            path: path.into(),
            value: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sort_key_parsing() {
        assert_eq!("sn".parse::<SortKey>().unwrap(), SortKey::ascending("sn"));
        assert_eq!("+sn".parse::<SortKey>().unwrap(), SortKey::ascending("sn"));
        assert_eq!("-sn".parse::<SortKey>().unwrap(), SortKey::descending("sn"));
        assert!("".parse::<SortKey>().is_err());
        assert!("-".parse::<SortKey>().is_err());
    }

    #[test]
    fn test_sort_key_display_round_trip() {
        for key in [SortKey::ascending("sn"), SortKey::descending("mail")] {
            assert_eq!(key.to_string().parse::<SortKey>().unwrap(), key);
        }
    }

    #[test]
    fn test_internal_context() {
        let context = RequestContext::internal();
        assert!(context.is_internal());
        assert!(!RequestContext::with_generated_id().is_internal());
    }

    #[test]
    fn test_patch_operation_serde() {
        let op: PatchOperation =
            serde_json::from_value(json!({"operation": "replace", "field": "mail", "value": "x"}))
                .unwrap();
        assert_eq!(op, PatchOperation::replace("mail", json!("x")));
        let removed: PatchOperation =
            serde_json::from_value(json!({"operation": "remove", "field": "mail"})).unwrap();
        assert_eq!(removed, PatchOperation::remove("mail"));
    }
}
