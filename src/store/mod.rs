//! Bulk submission of transformed rows to the search store
//!
//! This module provides:
//! - The [`BulkStore`] seam over a bulk-document endpoint
//! - [`BulkWriter`], which turns batches into sparse documents, chunks them,
//!   and reports per-document outcomes without failing on individual rejections

mod elastic;

pub use elastic::*;

use crate::error::Result;
use crate::record::RowBatch;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Upper bound on failure causes kept per outcome
pub const MAX_RECORDED_CAUSES: usize = 20;

/// A document ready for submission
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Store-side identifier; `None` lets the store assign one
    pub id: Option<String>,
    pub source: Map<String, Value>,
}

/// Store verdict for one submitted document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentStatus {
    Accepted,
    Rejected(String),
}

/// Bulk-document endpoint of a search store
#[async_trait]
pub trait BulkStore: Send + Sync {
    /// Submit `docs` to `collection` in one request.
    ///
    /// Returns one status per document, in order. Fails only when the request
    /// as a whole could not be completed.
    async fn bulk(&self, collection: &str, docs: &[Document]) -> Result<Vec<DocumentStatus>>;

    /// Check that the store is reachable
    async fn ping(&self) -> Result<()>;

    fn name(&self) -> &str;
}

/// Result of submitting one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionOutcome {
    pub submitted: usize,
    pub failed: usize,
    pub causes: Vec<String>,
}

impl IngestionOutcome {
    pub fn succeeded(&self) -> usize {
        self.submitted.saturating_sub(self.failed)
    }

    /// Fold another outcome into this one
    pub fn merge(&mut self, other: IngestionOutcome) {
        self.submitted += other.submitted;
        self.failed += other.failed;
        for cause in other.causes {
            self.record_cause(cause);
        }
    }

    fn record_cause(&mut self, cause: String) {
        if self.causes.len() < MAX_RECORDED_CAUSES {
            self.causes.push(cause);
        }
    }
}

/// Writes batches to a store in bounded `_bulk` chunks
#[derive(Clone)]
pub struct BulkWriter {
    store: Arc<dyn BulkStore>,
    chunk_size: usize,
    stable_ids: bool,
}

impl BulkWriter {
    pub fn new(store: Arc<dyn BulkStore>, chunk_size: usize, stable_ids: bool) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
            stable_ids,
        }
    }

    /// Convert rows to sparse documents, dropping null fields
    pub fn to_documents(&self, batch: RowBatch) -> Vec<Document> {
        let source_key = batch.source.to_string_lossy().into_owned();
        let offset = batch.offset;
        batch
            .rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| Document {
                id: self
                    .stable_ids
                    .then(|| stable_document_id(&source_key, offset + i)),
                source: row.into_document(),
            })
            .collect()
    }

    /// Submit every row of `batch` to `collection`.
    ///
    /// Rejected documents are counted and logged; only a failure of a whole
    /// bulk request is returned as an error.
    pub async fn submit(&self, batch: RowBatch, collection: &str) -> Result<IngestionOutcome> {
        let docs = self.to_documents(batch);
        let mut outcome = IngestionOutcome::default();

        for chunk in docs.chunks(self.chunk_size) {
            let statuses = self.store.bulk(collection, chunk).await?;
            outcome.submitted += chunk.len();

            for status in statuses.iter().take(chunk.len()) {
                if let DocumentStatus::Rejected(cause) = status {
                    outcome.failed += 1;
                    outcome.record_cause(cause.clone());
                }
            }
            if statuses.len() < chunk.len() {
                let missing = chunk.len() - statuses.len();
                outcome.failed += missing;
                outcome.record_cause(format!("{} documents returned no status", missing));
            }
            debug!(
                collection,
                sent = chunk.len(),
                store = self.store.name(),
                "Bulk chunk submitted"
            );
        }

        if outcome.failed > 0 {
            warn!(
                collection,
                submitted = outcome.submitted,
                failed = outcome.failed,
                "Store rejected {} documents; first cause: {}",
                outcome.failed,
                outcome.causes.first().map(String::as_str).unwrap_or("unknown")
            );
        }

        Ok(outcome)
    }
}

/// Deterministic id from the source file and row position
pub fn stable_document_id(source: &str, ordinal: usize) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(source.as_bytes());
    hasher.update(&[0]);
    hasher.update(&(ordinal as u64).to_le_bytes());
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use crate::record::{FieldValue, Record};
    use std::path::Path;
    use std::sync::Mutex;

    /// In-memory store that rejects documents whose `reject` field is true
    #[derive(Default)]
    pub(crate) struct RecordingStore {
        pub calls: Mutex<Vec<(String, Vec<Document>)>>,
        pub unreachable: bool,
        /// Rejections appended after the per-document statuses
        pub surplus_rejections: usize,
    }

    #[async_trait]
    impl BulkStore for RecordingStore {
        async fn bulk(&self, collection: &str, docs: &[Document]) -> Result<Vec<DocumentStatus>> {
            if self.unreachable {
                return Err(Error::Transport("connection refused".to_string()));
            }
            self.calls
                .lock()
                .unwrap()
                .push((collection.to_string(), docs.to_vec()));
            let surplus = (0..self.surplus_rejections)
                .map(|_| DocumentStatus::Rejected("unmatched item".to_string()));
            Ok(docs
                .iter()
                .map(|d| match d.source.get("reject") {
                    Some(Value::Bool(true)) => {
                        DocumentStatus::Rejected("mapper_parsing_exception".to_string())
                    }
                    _ => DocumentStatus::Accepted,
                })
                .chain(surplus)
                .collect())
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn batch_of(n: usize, rejected: &[usize]) -> RowBatch {
        let rows = (0..n)
            .map(|i| {
                let mut row = Record::new();
                row.set("n", FieldValue::Int(i as i64));
                row.set("sni", FieldValue::Null);
                if rejected.contains(&i) {
                    row.set("reject", FieldValue::Bool(true));
                }
                row
            })
            .collect();
        RowBatch::new(Path::new("/out/a.csv"), 0, rows)
    }

    #[tokio::test]
    async fn test_partial_rejection_is_reported_not_raised() {
        let store = Arc::new(RecordingStore::default());
        let writer = BulkWriter::new(store.clone(), 5000, false);

        let outcome = writer.submit(batch_of(10, &[3, 7]), "streaming").await.unwrap();

        assert_eq!(outcome.submitted, 10);
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.succeeded(), 8);
        assert_eq!(outcome.causes.len(), 2);
    }

    #[tokio::test]
    async fn test_surplus_statuses_are_ignored() {
        let store = Arc::new(RecordingStore {
            surplus_rejections: 5,
            ..Default::default()
        });
        let writer = BulkWriter::new(store, 2, false);

        let outcome = writer.submit(batch_of(3, &[1]), "streaming").await.unwrap();

        assert_eq!(outcome.submitted, 3);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.succeeded(), 2);
    }

    #[test]
    fn test_succeeded_never_underflows() {
        let outcome = IngestionOutcome {
            submitted: 1,
            failed: 3,
            causes: Vec::new(),
        };
        assert_eq!(outcome.succeeded(), 0);
    }

    #[tokio::test]
    async fn test_chunks_large_batches() {
        let store = Arc::new(RecordingStore::default());
        let writer = BulkWriter::new(store.clone(), 4, false);

        let outcome = writer.submit(batch_of(10, &[]), "streaming").await.unwrap();

        assert_eq!(outcome.submitted, 10);
        let calls = store.calls.lock().unwrap();
        assert_eq!(
            calls.iter().map(|(_, d)| d.len()).collect::<Vec<_>>(),
            vec![4, 4, 2]
        );
        assert!(calls.iter().all(|(c, _)| c == "streaming"));
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let store = Arc::new(RecordingStore {
            unreachable: true,
            ..Default::default()
        });
        let writer = BulkWriter::new(store, 5000, false);
        let result = writer.submit(batch_of(3, &[]), "streaming").await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[test]
    fn test_documents_are_sparse() {
        let store = Arc::new(RecordingStore::default());
        let writer = BulkWriter::new(store, 5000, false);
        let docs = writer.to_documents(batch_of(1, &[]));
        assert!(!docs[0].source.contains_key("sni"));
        assert!(docs[0].source.contains_key("n"));
        assert!(docs[0].id.is_none());
    }

    #[test]
    fn test_stable_ids_follow_row_position() {
        let store = Arc::new(RecordingStore::default());
        let writer = BulkWriter::new(store, 5000, true);

        let first = writer.to_documents(batch_of(2, &[]));
        let again = writer.to_documents(batch_of(2, &[]));
        assert_eq!(first[0].id, again[0].id);
        assert_ne!(first[0].id, first[1].id);

        let mut shifted = batch_of(1, &[]);
        shifted.offset = 1;
        assert_eq!(writer.to_documents(shifted)[0].id, first[1].id);
    }

    #[test]
    fn test_outcome_merge_caps_causes() {
        let mut total = IngestionOutcome::default();
        for _ in 0..30 {
            total.merge(IngestionOutcome {
                submitted: 1,
                failed: 1,
                causes: vec!["bad".to_string()],
            });
        }
        assert_eq!(total.failed, 30);
        assert_eq!(total.causes.len(), MAX_RECORDED_CAUSES);
    }
}
