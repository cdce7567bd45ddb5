//! In-memory directory backend.
//!
//! A thread-safe reference implementation of [`RequestHandler`] backed by a
//! `BTreeMap` behind an async `RwLock`. Designed for testing, development,
//! and scenarios where persistence is not required.
//!
//! # Semantics
//!
//! * Create generates a UUID identifier when none is supplied and rejects
//!   an identifier that is already taken
//! * Every write stamps `_meta.created` / `_meta.lastModified` (RFC 3339)
//!   and assigns a content-hash revision
//! * Update and patch honor an optional expected revision
//! * Query evaluates the parsed filter, applies sort keys and field
//!   projection, and streams in sorted order
//! * The directory defines no native actions
//!
//! # Example Usage
//!
//! ```rust
//! use repo_gateway::backend::{InMemoryDirectory, RequestHandler};
//! use repo_gateway::request::RequestContext;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let directory = InMemoryDirectory::new();
//! let context = RequestContext::with_generated_id();
//!
//! let created = directory
//!     .create(&context, None, json!({"uid": "jdoe", "mail": "jdoe@example.com"}))
//!     .await?;
//! let read_back = directory.read(&context, &created.id).await?;
//! assert_eq!(read_back.revision, created.revision);
//! # Ok(())
//! # }
//! ```

use crate::backend::{QuerySummary, RecordSink, RequestHandler};
use crate::error::{RepoError, RepoResult};
use crate::record::{self, FIELD_ID, ResourceRecord};
use crate::request::{ActionRequest, PatchOpKind, PatchOperation, QueryRequest, RequestContext, SortKey};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::Utc;
use log::{debug, trace, warn};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Thread-safe in-memory record directory.
///
/// Records are keyed by identifier; `BTreeMap` keeps list order stable
/// across runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    records: Arc<RwLock<BTreeMap<String, StoredEntry>>>,
}

#[derive(Debug, Clone)]
struct StoredEntry {
    revision: String,
    content: Value,
}

impl InMemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the directory holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Remove every record (useful for testing).
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }

    fn revision_of(content: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(content).unwrap_or_default());
        // first 8 bytes keep revision markers short
        BASE64.encode(&hasher.finalize()[..8])
    }

    fn stamp_meta(content: &mut Value, created: Option<String>) -> RepoResult<()> {
        let now = Utc::now().to_rfc3339();
        let object = content
            .as_object_mut()
            .ok_or_else(|| RepoError::bad_request("record content must be a JSON object"))?;
        let created = created.unwrap_or_else(|| now.clone());
        object.insert(
            "_meta".to_string(),
            json!({"created": created, "lastModified": now}),
        );
        Ok(())
    }

    fn created_of(content: &Value) -> Option<String> {
        record::field_value(content, "_meta.created")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn check_revision(entry: &StoredEntry, id: &str, expected: Option<&str>) -> RepoResult<()> {
        match expected {
            Some(revision) if revision != entry.revision => Err(RepoError::VersionConflict {
                id: id.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl RequestHandler for InMemoryDirectory {
    async fn read(&self, context: &RequestContext, id: &str) -> RepoResult<ResourceRecord> {
        trace!("reading '{}' (request: '{}')", id, context.request_id);
        let records = self.records.read().await;
        let entry = records.get(id).ok_or_else(|| RepoError::not_found(id))?;
        Ok(ResourceRecord::with_revision(
            id,
            entry.revision.clone(),
            entry.content.clone(),
        ))
    }

    async fn create(
        &self,
        context: &RequestContext,
        new_id: Option<&str>,
        mut content: Value,
    ) -> RepoResult<ResourceRecord> {
        let id = match new_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        debug!("creating '{}' (request: '{}')", id, context.request_id);
        Self::stamp_meta(&mut content, None)?;
        let revision = Self::revision_of(&content);
        let mut records = self.records.write().await;
        if records.contains_key(&id) {
            return Err(RepoError::AlreadyExists { id });
        }
        records.insert(
            id.clone(),
            StoredEntry {
                revision: revision.clone(),
                content: content.clone(),
            },
        );
        Ok(ResourceRecord::with_revision(id, revision, content))
    }

    async fn update(
        &self,
        context: &RequestContext,
        id: &str,
        revision: Option<&str>,
        mut content: Value,
    ) -> RepoResult<ResourceRecord> {
        debug!("updating '{}' (request: '{}')", id, context.request_id);
        let mut records = self.records.write().await;
        let entry = records.get_mut(id).ok_or_else(|| RepoError::not_found(id))?;
        Self::check_revision(entry, id, revision)?;
        Self::stamp_meta(&mut content, Self::created_of(&entry.content))?;
        entry.revision = Self::revision_of(&content);
        entry.content = content.clone();
        Ok(ResourceRecord::with_revision(id, entry.revision.clone(), content))
    }

    async fn patch(
        &self,
        context: &RequestContext,
        id: &str,
        revision: Option<&str>,
        operations: &[PatchOperation],
    ) -> RepoResult<ResourceRecord> {
        debug!(
            "patching '{}' with {} operation(s) (request: '{}')",
            id,
            operations.len(),
            context.request_id
        );
        let mut records = self.records.write().await;
        let entry = records.get_mut(id).ok_or_else(|| RepoError::not_found(id))?;
        Self::check_revision(entry, id, revision)?;
        let mut content = entry.content.clone();
        for operation in operations {
            match operation.kind {
                PatchOpKind::Add | PatchOpKind::Replace => {
                    let value = operation.value.clone().ok_or_else(|| {
                        RepoError::bad_request(format!(
                            "patch {} on '{}' requires a value",
                            operation.kind, operation.path
                        ))
                    })?;
                    record::set_field(&mut content, &operation.path, value)?;
                }
                PatchOpKind::Remove => {
                    record::remove_field(&mut content, &operation.path);
                }
            }
        }
        Self::stamp_meta(&mut content, Self::created_of(&entry.content))?;
        entry.revision = Self::revision_of(&content);
        entry.content = content.clone();
        Ok(ResourceRecord::with_revision(id, entry.revision.clone(), content))
    }

    async fn delete(&self, context: &RequestContext, id: &str) -> RepoResult<ResourceRecord> {
        debug!("deleting '{}' (request: '{}')", id, context.request_id);
        let mut records = self.records.write().await;
        let entry = records.remove(id).ok_or_else(|| RepoError::not_found(id))?;
        Ok(ResourceRecord::with_revision(id, entry.revision, entry.content))
    }

    async fn query(
        &self,
        context: &RequestContext,
        request: &QueryRequest,
        sink: &mut dyn RecordSink,
    ) -> RepoResult<QuerySummary> {
        if request.query_id.is_some() {
            return Err(RepoError::bad_request(
                "named queries must be normalized before reaching the directory",
            ));
        }
        trace!(
            "querying filter:{:?} (request: '{}')",
            request.filter, context.request_id
        );
        let mut matched: Vec<(String, StoredEntry)> = {
            let records = self.records.read().await;
            records
                .iter()
                .filter(|(_, entry)| {
                    request
                        .filter
                        .as_ref()
                        .is_none_or(|filter| filter.matches(&entry.content))
                })
                .map(|(id, entry)| (id.clone(), entry.clone()))
                .collect()
        };
        if !request.sort_keys.is_empty() {
            matched.sort_by(|(_, a), (_, b)| {
                compare_records(&a.content, &b.content, &request.sort_keys)
            });
        }
        let mut summary = QuerySummary::default();
        for (id, entry) in matched {
            let content = project(&entry.content, &request.fields);
            summary.delivered += 1;
            if !sink.accept(ResourceRecord::with_revision(id, entry.revision, content)) {
                break;
            }
        }
        Ok(summary)
    }

    async fn action(&self, _context: &RequestContext, request: &ActionRequest) -> RepoResult<Value> {
        Err(RepoError::bad_request(format!(
            "action '{}' is not supported by the directory backend",
            request.action
        )))
    }
}

fn compare_records(a: &Value, b: &Value, sort_keys: &[SortKey]) -> Ordering {
    for key in sort_keys {
        let ordering = compare_values(
            record::field_value(a, &key.field),
            record::field_value(b, &key.field),
        );
        let ordering = if key.ascending {
            ordering
        } else {
            ordering.reverse()
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => {
            if let (Some(m), Some(n)) = (x.as_f64(), y.as_f64()) {
                m.partial_cmp(&n).unwrap_or(Ordering::Equal)
            } else if let (Some(s), Some(t)) = (x.as_str(), y.as_str()) {
                s.cmp(t)
            } else if let (Some(p), Some(q)) = (x.as_bool(), y.as_bool()) {
                p.cmp(&q)
            } else {
                Ordering::Equal
            }
        }
    }
}

fn project(content: &Value, fields: &[String]) -> Value {
    if fields.is_empty() {
        return content.clone();
    }
    let mut projected = Value::Object(Map::new());
    for field in fields {
        // the identifier rides on the record itself, not in the content
        if field == FIELD_ID {
            continue;
        }
        if let Some(value) = record::field_value(content, field) {
            if let Err(error) = record::set_field(&mut projected, field, value.clone()) {
                warn!("skipping unprojectable field '{field}': {error}");
            }
        }
    }
    projected
}
