//! Per-type configuration: named queries, bulk commands and unique
//! constraints.
//!
//! Configuration is deserialized once, validated during type-handler
//! construction, and immutable afterward. Validation failures abort
//! construction; nothing is re-validated per call except the defensive
//! operation check in the command dispatch path.

use crate::error::{ConfigError, ConfigResult};
use serde::Deserialize;
use std::collections::HashMap;

/// The only bulk-command operation this crate implements.
pub const OPERATION_DELETE: &str = "DELETE";

/// A value that may be written either as a comma-separated string or as a
/// list of strings. Both encodings are accepted for sort keys and field
/// projections.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

/// A configured named query.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryConfig {
    /// Filter template with `${token}` placeholders; required
    pub query_filter: Option<String>,
    /// Default sort keys applied when the query is invoked
    pub sort_keys: Option<StringOrList>,
    /// Default field projection applied when the query is invoked
    pub fields: Option<StringOrList>,
}

/// A configured bulk command.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandConfig {
    /// Operation kind; only `DELETE` is supported, case-insensitive
    pub operation: Option<String>,
    /// Literal (untemplated) filter selecting the records to act on
    pub query_filter: Option<String>,
}

/// Configuration for one resource type.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TypeHandlerConfig {
    /// Configured queries, keyed by query id
    pub queries: HashMap<String, QueryConfig>,
    /// Configured commands, keyed by command id
    pub commands: HashMap<String, CommandConfig>,
    /// Attribute combinations that must be unique across the type; each
    /// constraint is an ordered list of field paths
    pub unique_constraints: Vec<Vec<String>>,
}

impl TypeHandlerConfig {
    /// Validate every query and command definition.
    ///
    /// Runs once at handler construction; a single invalid entry fails the
    /// whole configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        for (query_id, query) in &self.queries {
            validate_query(query_id, query)?;
        }
        for (command_id, command) in &self.commands {
            validate_command(command_id, command)?;
        }
        Ok(())
    }
}

fn validate_query(query_id: &str, query: &QueryConfig) -> ConfigResult<()> {
    if query.query_filter.as_deref().is_none_or(str::is_empty) {
        return Err(ConfigError::QueryMissingFilter {
            query_id: query_id.to_string(),
        });
    }
    Ok(())
}

fn validate_command(command_id: &str, command: &CommandConfig) -> ConfigResult<()> {
    let operation = match command.operation.as_deref() {
        Some(operation) if !operation.is_empty() => operation,
        _ => {
            return Err(ConfigError::CommandMissingOperation {
                command_id: command_id.to_string(),
            });
        }
    };
    if !operation.eq_ignore_ascii_case(OPERATION_DELETE) {
        return Err(ConfigError::UnsupportedCommandOperation {
            command_id: command_id.to_string(),
            operation: operation.to_string(),
        });
    }
    if command.query_filter.as_deref().is_none_or(str::is_empty) {
        return Err(ConfigError::CommandMissingFilter {
            command_id: command_id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_from(value: serde_json::Value) -> TypeHandlerConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_deserialize_both_sort_key_encodings() {
        let config = config_from(json!({
            "queries": {
                "all": {"queryFilter": "uid pr", "sortKeys": "sn,givenName"},
                "listed": {"queryFilter": "uid pr", "sortKeys": ["sn", "givenName"]}
            }
        }));
        assert_eq!(
            config.queries["all"].sort_keys,
            Some(StringOrList::One("sn,givenName".to_string()))
        );
        assert_eq!(
            config.queries["listed"].sort_keys,
            Some(StringOrList::Many(vec![
                "sn".to_string(),
                "givenName".to_string()
            ]))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_query_without_filter_rejected() {
        let config = config_from(json!({"queries": {"broken": {"sortKeys": "sn"}}}));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::QueryMissingFilter { query_id }) if query_id == "broken"
        ));
    }

    #[test]
    fn test_command_operation_case_insensitive() {
        let config = config_from(json!({
            "commands": {"purge": {"operation": "delete", "queryFilter": "active eq false"}}
        }));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_command_missing_operation_rejected() {
        let config = config_from(json!({
            "commands": {"purge": {"queryFilter": "active eq false"}}
        }));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CommandMissingOperation { .. })
        ));
    }

    #[test]
    fn test_unsupported_operation_rejected() {
        let config = config_from(json!({
            "commands": {"purge": {"operation": "TRUNCATE", "queryFilter": "uid pr"}}
        }));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedCommandOperation { operation, .. }) if operation == "TRUNCATE"
        ));
    }

    #[test]
    fn test_delete_command_without_filter_rejected() {
        let config = config_from(json!({
            "commands": {"purge": {"operation": "DELETE"}}
        }));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CommandMissingFilter { .. })
        ));
    }

    #[test]
    fn test_unique_constraints_deserialize() {
        let config = config_from(json!({
            "uniqueConstraints": [["mail"], ["sn", "givenName"]]
        }));
        assert_eq!(config.unique_constraints.len(), 2);
        assert_eq!(config.unique_constraints[1], vec!["sn", "givenName"]);
    }
}
