//! Per-type request façade.
//!
//! A [`TypeHandler`] fronts one resource type (e.g. `managed/user`) on a
//! backing store. It resolves named queries, executes configured bulk
//! commands, enforces unique constraints around writes, and applies the
//! type's output transform to every record on its way back to the caller.

use crate::backend::{QuerySummary, RecordSink, RequestHandler};
use crate::config::{CommandConfig, OPERATION_DELETE, TypeHandlerConfig};
use crate::error::{ConfigError, RepoError, RepoResult};
use crate::filter::Filter;
use crate::query::QueryNormalizer;
use crate::record::{FIELD_ID, ResourceRecord};
use crate::request::{ActionRequest, PatchOperation, QueryRequest, RequestContext};
use crate::uniqueness::UniqueAttributeResolver;
use log::{debug, info};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Reserved action name dispatching to the bulk-command protocol.
pub const ACTION_COMMAND: &str = "command";

/// Additional parameter naming the command to run.
pub const PARAM_COMMAND_ID: &str = "commandId";

/// Per-type reshaping of backend content into the externally exposed shape.
///
/// Implemented once per resource type (field renaming, filtering,
/// decoration). The transform is pure: content in, content out. It may
/// fail, and a failure aborts the enclosing operation with that error.
pub trait OutputTransform: Send + Sync {
    /// Transform content after it has been retrieved from the backing store.
    fn transform(&self, content: Value) -> RepoResult<Value>;
}

/// Transform that passes content through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl OutputTransform for IdentityTransform {
    fn transform(&self, content: Value) -> RepoResult<Value> {
        Ok(content)
    }
}

/// A handler for a single resource type.
pub struct TypeHandler<H: RequestHandler, T: OutputTransform> {
    resource_path: String,
    backend: Arc<H>,
    normalizer: QueryNormalizer,
    commands: HashMap<String, CommandConfig>,
    resolver: UniqueAttributeResolver<H>,
    transform: T,
}

impl<H: RequestHandler, T: OutputTransform> TypeHandler<H, T> {
    /// Create a new type handler.
    ///
    /// Validates the whole configuration up front; any invalid query or
    /// command definition fails construction and no handler is produced.
    ///
    /// # Arguments
    /// * `resource_path` - The path of this resource type on the backend
    /// * `backend` - The request handler for backing-store access
    /// * `config` - Configuration specific to this type
    /// * `transform` - The type's output transform
    pub fn new(
        resource_path: impl Into<String>,
        backend: Arc<H>,
        config: TypeHandlerConfig,
        transform: T,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let resource_path = resource_path.into();
        let resolver = UniqueAttributeResolver::new(
            config.unique_constraints,
            Arc::clone(&backend),
            resource_path.clone(),
        );
        Ok(Self {
            resource_path,
            backend,
            normalizer: QueryNormalizer::new(config.queries),
            commands: config.commands,
            resolver,
            transform,
        })
    }

    /// The path of this resource type on the backend.
    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    /// Read a record by identifier.
    pub async fn read(&self, context: &RequestContext, id: &str) -> RepoResult<ResourceRecord> {
        debug!(
            "reading '{}' on {} (request: '{}')",
            id, self.resource_path, context.request_id
        );
        let record = self.backend.read(context, id).await?;
        self.transform_record(record)
    }

    /// Create a record, enforcing the type's unique constraints first.
    pub async fn create(
        &self,
        context: &RequestContext,
        new_id: Option<&str>,
        content: Value,
    ) -> RepoResult<ResourceRecord> {
        debug!(
            "creating on {} (request: '{}')",
            self.resource_path, context.request_id
        );
        self.resolver.check_constraints(&content, None).await?;
        let record = self.backend.create(context, new_id, content).await?;
        self.transform_record(record)
    }

    /// Replace a record's content, enforcing the type's unique constraints
    /// first (the record itself is not its own collision).
    pub async fn update(
        &self,
        context: &RequestContext,
        id: &str,
        revision: Option<&str>,
        content: Value,
    ) -> RepoResult<ResourceRecord> {
        debug!(
            "updating '{}' on {} (request: '{}')",
            id, self.resource_path, context.request_id
        );
        self.resolver.check_constraints(&content, Some(id)).await?;
        let record = self.backend.update(context, id, revision, content).await?;
        self.transform_record(record)
    }

    /// Apply a partial update.
    pub async fn patch(
        &self,
        context: &RequestContext,
        id: &str,
        revision: Option<&str>,
        operations: &[PatchOperation],
    ) -> RepoResult<ResourceRecord> {
        debug!(
            "patching '{}' on {} (request: '{}')",
            id, self.resource_path, context.request_id
        );
        let record = self.backend.patch(context, id, revision, operations).await?;
        self.transform_record(record)
    }

    /// Delete a record, returning its transformed last known state.
    pub async fn delete(&self, context: &RequestContext, id: &str) -> RepoResult<ResourceRecord> {
        debug!(
            "deleting '{}' on {} (request: '{}')",
            id, self.resource_path, context.request_id
        );
        let record = self.backend.delete(context, id).await?;
        self.transform_record(record)
    }

    /// Run a query, streaming transformed records to the sink.
    ///
    /// A named-query reference is resolved first; the backend then streams
    /// matches through a wrapper that transforms each record before
    /// forwarding it. The first transform failure stops the stream and
    /// becomes the query's outcome.
    pub async fn query<S>(
        &self,
        context: &RequestContext,
        request: &QueryRequest,
        sink: &mut S,
    ) -> RepoResult<QuerySummary>
    where
        S: RecordSink + ?Sized,
    {
        debug!(
            "querying {} filter:{:?} (request: '{}')",
            self.resource_path, request.filter, context.request_id
        );
        let normalized = self.normalizer.normalize(request)?;
        let mut proxy = TransformingSink {
            downstream: sink,
            transform: &self.transform,
            failure: None,
        };
        let summary = self.backend.query(context, &normalized, &mut proxy).await;
        if let Some(failure) = proxy.failure.take() {
            return Err(failure);
        }
        summary
    }

    /// Execute a named action.
    ///
    /// The reserved action name `command` dispatches to the bulk-command
    /// protocol; anything else is delegated to the backend, with the output
    /// transform applied to its payload.
    pub async fn action(&self, context: &RequestContext, request: &ActionRequest) -> RepoResult<Value> {
        if request.action.eq_ignore_ascii_case(ACTION_COMMAND) {
            return self.execute_command(request).await;
        }
        let payload = self.backend.action(context, request).await?;
        self.transform.transform(payload)
    }

    async fn execute_command(&self, request: &ActionRequest) -> RepoResult<Value> {
        let command_id = request
            .additional_parameters
            .get(PARAM_COMMAND_ID)
            .map(String::as_str)
            .unwrap_or_default();
        if command_id.is_empty() {
            return Err(RepoError::bad_request("commandId parameter is required"));
        }
        let command = self.commands.get(command_id).ok_or_else(|| {
            RepoError::bad_request(format!("commandId parameter unknown: {command_id}"))
        })?;
        // validated at construction; unreachable unless the config was bypassed
        let operation = command.operation.as_deref().unwrap_or_default();
        if !operation.eq_ignore_ascii_case(OPERATION_DELETE) {
            return Err(RepoError::internal(format!(
                "command operation '{operation}' unsupported: {command_id}"
            )));
        }
        self.execute_delete_command(command_id, command).await
    }

    /// Handles a delete-command, which deletes multiple records at once.
    ///
    /// The sub-operations run sequentially under the internal identity. A
    /// failure aborts the remaining deletes; records already deleted stay
    /// deleted.
    async fn execute_delete_command(
        &self,
        command_id: &str,
        command: &CommandConfig,
    ) -> RepoResult<Value> {
        let filter_source = command.query_filter.as_deref().ok_or_else(|| {
            RepoError::internal(format!("command missing filter: {command_id}"))
        })?;
        let filter = Filter::parse(filter_source)?;
        let query = QueryRequest::new().with_field(FIELD_ID).with_filter(filter);
        let context = RequestContext::internal();

        // query for identifiers to delete
        let mut ids: Vec<String> = Vec::new();
        {
            let mut collect = |record: ResourceRecord| {
                ids.push(record.id);
                true
            };
            self.query(&context, &query, &mut collect).await?;
        }
        info!(
            "command '{}' matched {} record(s) on {}",
            command_id,
            ids.len(),
            self.resource_path
        );

        // delete each result by identifier, one at a time
        for id in &ids {
            self.delete(&context, id).await?;
        }
        Ok(Value::from(ids.len() as u64))
    }

    fn transform_record(&self, record: ResourceRecord) -> RepoResult<ResourceRecord> {
        let ResourceRecord {
            id,
            revision,
            content,
        } = record;
        Ok(ResourceRecord {
            id,
            revision,
            content: self.transform.transform(content)?,
        })
    }
}

/// Proxy sink applying the output transform to each streamed record.
///
/// The first transform failure is recorded in a single-assignment slot
/// owned by the enclosing call and stops the stream; nothing untransformed
/// ever reaches the downstream sink.
struct TransformingSink<'a, S: RecordSink + ?Sized, T: OutputTransform> {
    downstream: &'a mut S,
    transform: &'a T,
    failure: Option<RepoError>,
}

impl<'a, S: RecordSink + ?Sized, T: OutputTransform> RecordSink for TransformingSink<'a, S, T> {
    fn accept(&mut self, record: ResourceRecord) -> bool {
        if self.failure.is_some() {
            return false;
        }
        let ResourceRecord {
            id,
            revision,
            content,
        } = record;
        match self.transform.transform(content) {
            Ok(content) => self.downstream.accept(ResourceRecord {
                id,
                revision,
                content,
            }),
            Err(error) => {
                self.failure = Some(error);
                false
            }
        }
    }
}
