use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{AppConfig, BackendMode};
use crate::db::memory::InMemoryDocumentStore;
use crate::db::repository::DocumentStore;
use crate::db::scylla::ScyllaDocumentStore;
use crate::error::AppError;
use crate::search::client::SearchIndex;
use crate::search::elasticsearch::ElasticsearchIndex;
use crate::search::memory::InMemorySearchIndex;
use crate::search::service::SearchService;
use crate::sync::service::{SyncReport, Synchronizer};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub synchronizer: Synchronizer,
    pub search: SearchService,
    /// Index documents as they are written through the API.
    pub index_on_write: bool,
    /// Written by the sync scheduler, read by the health endpoint.
    pub last_scheduled_sync: Arc<RwLock<Option<SyncReport>>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Arc<dyn SearchIndex>,
        config: &AppConfig,
    ) -> Self {
        Self {
            synchronizer: Synchronizer::new(store.clone(), index.clone(), config.sync.concurrency),
            search: SearchService::new(index, config.elasticsearch.max_result_window),
            store,
            index_on_write: config.sync.index_on_write,
            last_scheduled_sync: Arc::new(RwLock::new(None)),
        }
    }

    /// Connect the configured backends and make sure the index exists.
    pub async fn connect(config: &AppConfig) -> Result<Self, AppError> {
        let (store, index): (Arc<dyn DocumentStore>, Arc<dyn SearchIndex>) = match config.backend
        {
            BackendMode::Memory => {
                tracing::warn!("Using in-memory backends; nothing is persisted");
                (
                    Arc::new(InMemoryDocumentStore::new()),
                    Arc::new(InMemorySearchIndex::new()),
                )
            }
            BackendMode::ScyllaElasticsearch => {
                let store = ScyllaDocumentStore::connect(&config.scylla).await?;
                let index = ElasticsearchIndex::new(&config.elasticsearch)?;
                tracing::info!(
                    url = %config.elasticsearch.url,
                    index = %index.index_name(),
                    "Elasticsearch client initialized"
                );
                (Arc::new(store), Arc::new(index))
            }
        };

        index.create_index().await?;
        Ok(Self::new(store, index, config))
    }
}
