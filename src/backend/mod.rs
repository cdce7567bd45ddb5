//! Backing-store interface consumed by type handlers.
//!
//! The gateway is a translation layer: it shapes requests on the way into a
//! [`RequestHandler`] and reshapes records on the way out. The handler trait
//! is the whole contract — the gateway performs no storage I/O of its own,
//! and the backend owns persistence, revisions and consistency.
//!
//! Query results are streamed: the backend delivers each match to a
//! [`RecordSink`] in backend order, and the sink's return value decides
//! whether streaming continues.

pub mod in_memory;

pub use in_memory::InMemoryDirectory;

use crate::error::RepoResult;
use crate::record::ResourceRecord;
use crate::request::{ActionRequest, PatchOperation, QueryRequest, RequestContext};
use serde_json::Value;
use std::future::Future;

/// Summary of a completed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuerySummary {
    /// Number of records handed to the sink, including one the sink may
    /// have declined by returning `false`
    pub delivered: usize,
}

/// Per-record callback for streamed query results.
pub trait RecordSink: Send {
    /// Handle one streamed record. Return `false` to stop the stream.
    fn accept(&mut self, record: ResourceRecord) -> bool;
}

impl<F> RecordSink for F
where
    F: FnMut(ResourceRecord) -> bool + Send,
{
    fn accept(&mut self, record: ResourceRecord) -> bool {
        self(record)
    }
}

/// Request handler for one resource collection in the backing store.
///
/// Every operation is an independent asynchronous unit of work; each
/// returns a future resolving to a record (or summary/payload) or failing
/// with a structured error. Failures returned here propagate to gateway
/// callers unchanged.
pub trait RequestHandler: Send + Sync {
    /// Read a record by identifier.
    fn read(
        &self,
        context: &RequestContext,
        id: &str,
    ) -> impl Future<Output = RepoResult<ResourceRecord>> + Send;

    /// Create a record, generating an identifier when none is supplied.
    fn create(
        &self,
        context: &RequestContext,
        new_id: Option<&str>,
        content: Value,
    ) -> impl Future<Output = RepoResult<ResourceRecord>> + Send;

    /// Replace a record's content. A supplied revision must match the
    /// stored record.
    fn update(
        &self,
        context: &RequestContext,
        id: &str,
        revision: Option<&str>,
        content: Value,
    ) -> impl Future<Output = RepoResult<ResourceRecord>> + Send;

    /// Apply a partial update. A supplied revision must match the stored
    /// record.
    fn patch(
        &self,
        context: &RequestContext,
        id: &str,
        revision: Option<&str>,
        operations: &[PatchOperation],
    ) -> impl Future<Output = RepoResult<ResourceRecord>> + Send;

    /// Delete a record, returning its last known state.
    fn delete(
        &self,
        context: &RequestContext,
        id: &str,
    ) -> impl Future<Output = RepoResult<ResourceRecord>> + Send;

    /// Stream every record matching the request's filter to the sink, in
    /// backend order, honoring the sink's continue flag.
    ///
    /// The request must already be normalized: a lingering named-query
    /// reference is a caller error.
    fn query(
        &self,
        context: &RequestContext,
        request: &QueryRequest,
        sink: &mut dyn RecordSink,
    ) -> impl Future<Output = RepoResult<QuerySummary>> + Send;

    /// Execute a backend-defined action and return its payload.
    fn action(
        &self,
        context: &RequestContext,
        request: &ActionRequest,
    ) -> impl Future<Output = RepoResult<Value>> + Send;
}
