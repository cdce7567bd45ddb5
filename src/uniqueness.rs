//! Unique attribute-combination enforcement.
//!
//! Each configured constraint is an ordered list of field paths whose
//! combined values must be distinct across all records of the type. The
//! check is a pre-flight lookup before a create or update reaches the
//! backing store; it is not transactional with the subsequent write, so a
//! race between check and write can admit a duplicate under concurrent
//! writers. The backend offers no multi-record transaction primitive at
//! this layer.

use crate::backend::RequestHandler;
use crate::error::{RepoError, RepoResult};
use crate::filter::Filter;
use crate::record::{self, FIELD_ID, ResourceRecord};
use crate::request::{QueryRequest, RequestContext};
use log::debug;
use serde_json::Value;
use std::sync::Arc;

/// Checks configured unique constraints against the backing store.
pub struct UniqueAttributeResolver<H: RequestHandler> {
    constraints: Vec<Vec<String>>,
    backend: Arc<H>,
    resource_path: String,
}

impl<H: RequestHandler> UniqueAttributeResolver<H> {
    /// Create a resolver over an immutable constraint list.
    pub fn new(constraints: Vec<Vec<String>>, backend: Arc<H>, resource_path: String) -> Self {
        Self {
            constraints,
            backend,
            resource_path,
        }
    }

    /// Check every constraint against a candidate record's content.
    ///
    /// A constraint whose fields are not all present (with scalar values)
    /// does not apply to the record. When updating, the record's own
    /// identifier is excluded from the collision set. Constraints are
    /// evaluated independently; the first violation fails the operation.
    pub async fn check_constraints(
        &self,
        content: &Value,
        exclude_id: Option<&str>,
    ) -> RepoResult<()> {
        for constraint in &self.constraints {
            let Some(filter) = constraint_filter(constraint, content) else {
                continue;
            };
            let query = QueryRequest::new().with_field(FIELD_ID).with_filter(filter);
            let context = RequestContext::internal();
            let mut conflicting: Vec<String> = Vec::new();
            {
                let mut collect = |record: ResourceRecord| {
                    if exclude_id != Some(record.id.as_str()) {
                        conflicting.push(record.id);
                    }
                    true
                };
                self.backend.query(&context, &query, &mut collect).await?;
            }
            if !conflicting.is_empty() {
                debug!(
                    "unique constraint {:?} on {} collides with {:?}",
                    constraint, self.resource_path, conflicting
                );
                return Err(RepoError::ConstraintViolation {
                    fields: constraint.clone(),
                    conflicting_ids: conflicting,
                });
            }
        }
        Ok(())
    }
}

/// Build the equality lookup for one constraint, or `None` when the
/// constraint does not apply to this record.
fn constraint_filter(constraint: &[String], content: &Value) -> Option<Filter> {
    let mut terms = Vec::with_capacity(constraint.len());
    for field in constraint {
        let value = record::field_value(content, field)?;
        if !is_scalar(value) {
            return None;
        }
        terms.push(Filter::equals(field.clone(), value.clone()));
    }
    if terms.is_empty() {
        return None;
    }
    Some(Filter::all(terms))
}

fn is_scalar(value: &Value) -> bool {
    value.is_string() || value.is_number() || value.is_boolean()
}
