use std::sync::Arc;
use std::time::Instant;

use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::db::repository::DocumentStore;
use crate::error::AppError;
use crate::models::document::Document;
use crate::search::client::SearchIndex;

/// What a sweep covered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncScope {
    All,
    Category(String),
    Rebuild,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub scope: SyncScope,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Ids whose index write failed, sorted.
    pub failed_ids: Vec<String>,
    pub elapsed_millis: u64,
}

/// Pushes documents from the store into the search index.
///
/// Every index write is an upsert keyed by document id, so sweeps may
/// overlap each other and live traffic; the last write per id wins.
#[derive(Clone)]
pub struct Synchronizer {
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn SearchIndex>,
    concurrency: usize,
}

impl Synchronizer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Arc<dyn SearchIndex>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            index,
            concurrency: concurrency.max(1),
        }
    }

    /// Index every stored document.
    ///
    /// A store read failure aborts the sweep. Index failures are logged and
    /// counted per document; the sweep always runs to the end.
    pub async fn sync_all(&self) -> Result<SyncReport, AppError> {
        tracing::info!("Starting full index sync");
        let docs = self.store.find_all().await?;
        Ok(self.index_batch(SyncScope::All, docs).await)
    }

    /// Index the documents of one category.
    pub async fn sync_category(&self, category: &str) -> Result<SyncReport, AppError> {
        if category.trim().is_empty() {
            return Err(AppError::Validation("Category is required".into()));
        }
        tracing::info!(category, "Starting category index sync");
        let docs = self.store.find_by_category(category).await?;
        Ok(self
            .index_batch(SyncScope::Category(category.to_string()), docs)
            .await)
    }

    /// Index a single document. The index error, if any, is returned.
    pub async fn sync_one(&self, doc: &Document) -> Result<(), AppError> {
        doc.validate()?;
        self.index.index_document(doc).await?;
        tracing::debug!(id = %doc.id, "Document indexed");
        Ok(())
    }

    /// Remove a document from the index.
    pub async fn remove_one(&self, id: &str) -> Result<(), AppError> {
        self.index.delete_by_id(id).await?;
        tracing::debug!(id, "Document removed from index");
        Ok(())
    }

    /// Drop and recreate the index, then repopulate it from the store.
    ///
    /// Searches issued between the drop and the end of the sweep see an
    /// empty or partial index.
    pub async fn rebuild_all(&self) -> Result<SyncReport, AppError> {
        tracing::info!("Rebuilding search index");
        let started = Instant::now();

        self.index.delete_index().await?;
        self.index.create_index().await?;

        let docs = self.store.find_all().await?;
        let mut report = self.index_batch(SyncScope::Rebuild, docs).await;
        report.elapsed_millis = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    async fn index_batch(&self, scope: SyncScope, docs: Vec<Document>) -> SyncReport {
        let started = Instant::now();
        let total = docs.len();
        let index = &self.index;

        let outcomes: Vec<(String, Result<(), AppError>)> = stream::iter(docs)
            .map(|doc| async move {
                let result = index.index_document(&doc).await;
                (doc.id, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut failed_ids = Vec::new();
        for (id, result) in outcomes {
            if let Err(e) = result {
                tracing::warn!(id = %id, "Failed to index document: {}", e);
                failed_ids.push(id);
            }
        }
        failed_ids.sort();

        let report = SyncReport {
            scope,
            total,
            succeeded: total - failed_ids.len(),
            failed: failed_ids.len(),
            failed_ids,
            elapsed_millis: started.elapsed().as_millis() as u64,
        };

        tracing::info!(
            scope = ?report.scope,
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            elapsed_millis = report.elapsed_millis,
            "Index sync finished"
        );
        report
    }
}
