//! Resource repository gateway library.
//!
//! Translates a uniform CRUD-plus-query-plus-command surface, one handler
//! per resource type, into operations against a directory-style backing
//! store while enforcing per-type configuration: named queries with token
//! substitution, named bulk commands, and cross-field uniqueness
//! constraints.
//!
//! # Core Components
//!
//! - [`TypeHandler`] - Per-type façade over a backing store
//! - [`RequestHandler`] - Trait for implementing backing stores
//! - [`QueryNormalizer`] - Named query → concrete filter resolution
//! - [`UniqueAttributeResolver`] - Cross-field uniqueness enforcement
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use repo_gateway::backend::InMemoryDirectory;
//! use repo_gateway::config::TypeHandlerConfig;
//! use repo_gateway::handler::{IdentityTransform, TypeHandler};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(InMemoryDirectory::new());
//! let config: TypeHandlerConfig = serde_json::from_value(serde_json::json!({
//!     "queries": {
//!         "byEmail": { "queryFilter": "mail eq \"${email}\"" }
//!     },
//!     "commands": {
//!         "purgeInactive": { "operation": "DELETE", "queryFilter": "active eq false" }
//!     },
//!     "uniqueConstraints": [["mail"]]
//! }))?;
//! let handler = TypeHandler::new("managed/user", backend, config, IdentityTransform)?;
//! # let _ = handler;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod filter;
pub mod handler;
pub mod query;
pub mod record;
pub mod request;
pub mod token;
pub mod uniqueness;

// Re-export commonly used types for convenience
pub use backend::{InMemoryDirectory, QuerySummary, RecordSink, RequestHandler};
pub use config::{CommandConfig, QueryConfig, StringOrList, TypeHandlerConfig};
pub use error::{ConfigError, ConfigResult, RepoError, RepoResult};
pub use filter::{CompareOp, Filter, FilterParseError};
pub use handler::{ACTION_COMMAND, IdentityTransform, OutputTransform, PARAM_COMMAND_ID, TypeHandler};
pub use query::QueryNormalizer;
pub use record::{FIELD_ID, ResourceRecord};
pub use request::{
    ActionRequest, PatchOpKind, PatchOperation, QueryRequest, RequestContext, SortKey,
};
pub use uniqueness::UniqueAttributeResolver;
