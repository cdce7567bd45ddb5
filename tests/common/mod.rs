//! Shared helpers for integration tests.

use repo_gateway::backend::{InMemoryDirectory, QuerySummary, RecordSink, RequestHandler};
use repo_gateway::error::{RepoError, RepoResult};
use repo_gateway::handler::OutputTransform;
use repo_gateway::record::{self, ResourceRecord};
use repo_gateway::request::{ActionRequest, PatchOperation, QueryRequest, RequestContext};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub async fn seed(backend: &InMemoryDirectory, id: &str, content: Value) {
    backend
        .create(&RequestContext::internal(), Some(id), content)
        .await
        .expect("seeding record");
}

/// Transform used by the user type in tests: renames `uid` to `userName`
/// and strips the backend's `_meta` block.
pub struct UserTransform;

impl OutputTransform for UserTransform {
    fn transform(&self, mut content: Value) -> RepoResult<Value> {
        if let Some(object) = content.as_object_mut() {
            object.remove("_meta");
            if let Some(uid) = object.remove("uid") {
                object.insert("userName".to_string(), uid);
            }
        }
        Ok(content)
    }
}

/// Transform that rejects any record carrying a `poison` field.
pub struct PoisonTransform;

impl OutputTransform for PoisonTransform {
    fn transform(&self, content: Value) -> RepoResult<Value> {
        if record::field_value(&content, "poison").is_some() {
            return Err(RepoError::internal("transform rejected record"));
        }
        Ok(content)
    }
}

/// Backend wrapper counting queries and deletes, optionally failing the
/// n-th delete (0-based).
pub struct InstrumentedBackend {
    inner: InMemoryDirectory,
    pub queries: Arc<AtomicUsize>,
    pub deletes: Arc<AtomicUsize>,
    fail_delete_at: Option<usize>,
}

impl InstrumentedBackend {
    pub fn new(inner: InMemoryDirectory) -> Self {
        Self {
            inner,
            queries: Arc::new(AtomicUsize::new(0)),
            deletes: Arc::new(AtomicUsize::new(0)),
            fail_delete_at: None,
        }
    }

    pub fn failing_delete_at(inner: InMemoryDirectory, index: usize) -> Self {
        Self {
            fail_delete_at: Some(index),
            ..Self::new(inner)
        }
    }
}

impl RequestHandler for InstrumentedBackend {
    async fn read(&self, context: &RequestContext, id: &str) -> RepoResult<ResourceRecord> {
        self.inner.read(context, id).await
    }

    async fn create(
        &self,
        context: &RequestContext,
        new_id: Option<&str>,
        content: Value,
    ) -> RepoResult<ResourceRecord> {
        self.inner.create(context, new_id, content).await
    }

    async fn update(
        &self,
        context: &RequestContext,
        id: &str,
        revision: Option<&str>,
        content: Value,
    ) -> RepoResult<ResourceRecord> {
        self.inner.update(context, id, revision, content).await
    }

    async fn patch(
        &self,
        context: &RequestContext,
        id: &str,
        revision: Option<&str>,
        operations: &[PatchOperation],
    ) -> RepoResult<ResourceRecord> {
        self.inner.patch(context, id, revision, operations).await
    }

    async fn delete(&self, context: &RequestContext, id: &str) -> RepoResult<ResourceRecord> {
        let attempt = self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete_at == Some(attempt) {
            return Err(RepoError::internal("simulated delete failure"));
        }
        self.inner.delete(context, id).await
    }

    async fn query(
        &self,
        context: &RequestContext,
        request: &QueryRequest,
        sink: &mut dyn RecordSink,
    ) -> RepoResult<QuerySummary> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(context, request, sink).await
    }

    async fn action(&self, context: &RequestContext, request: &ActionRequest) -> RepoResult<Value> {
        self.inner.action(context, request).await
    }
}
