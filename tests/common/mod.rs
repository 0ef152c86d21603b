#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Duration, Utc};

use searchgate::config::{AppConfig, BackendMode};
use searchgate::db::memory::InMemoryDocumentStore;
use searchgate::db::repository::DocumentStore;
use searchgate::models::document::Document;
use searchgate::search::memory::InMemorySearchIndex;
use searchgate::state::AppState;

/// In-process backends plus the full API router.
///
/// Store and index are kept as concrete types so tests can seed data and
/// inject failures directly.
pub struct TestEnv {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryDocumentStore>,
    pub index: Arc<InMemorySearchIndex>,
}

impl TestEnv {
    pub fn start() -> Self {
        Self::with_config(memory_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(InMemoryDocumentStore::new());
        let index = Arc::new(InMemorySearchIndex::new());
        let state = AppState::new(store.clone(), index.clone(), &config);
        let router = searchgate::app::router(state.clone());
        Self {
            router,
            state,
            store,
            index,
        }
    }

    /// Build an `axum_test::TestServer` from this environment's router.
    pub fn server(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .expect_success_by_default()
            .try_build(self.router.clone())
            .expect("Failed to build TestServer")
    }

    /// Build a `TestServer` that does NOT expect success by default (for error tests).
    pub fn server_permissive(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .try_build(self.router.clone())
            .expect("Failed to build TestServer")
    }

    /// Helper: put a document straight into the store, bypassing the index.
    pub async fn seed(&self, doc: Document) -> Document {
        self.store.save(doc).await.expect("Failed to seed document")
    }

    /// Helper: seed the store and run a full sync so every document is searchable.
    pub async fn seed_indexed(&self, docs: Vec<Document>) {
        for doc in docs {
            self.seed(doc).await;
        }
        let report = self
            .state
            .synchronizer
            .sync_all()
            .await
            .expect("Failed to sync seeded documents");
        assert_eq!(report.failed, 0, "seed sync reported failures");
    }

    /// Helper: create a document through the API.
    pub async fn create(
        &self,
        server: &axum_test::TestServer,
        body: serde_json::Value,
    ) -> axum_test::TestResponse {
        server.post("/api/documents").json(&body).await
    }
}

pub fn memory_config() -> AppConfig {
    AppConfig {
        backend: BackendMode::Memory,
        ..Default::default()
    }
}

/// A document created `age_days` ago.
pub fn doc(id: &str, title: &str, content: &str, category: Option<&str>, age_days: i64) -> Document {
    let created: DateTime<Utc> = Utc::now() - Duration::days(age_days);
    Document {
        id: id.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        category: category.map(str::to_string),
        author: None,
        metadata: BTreeMap::new(),
        created_at: created,
        updated_at: created,
    }
}

/// Ids of the documents in a search response body, in result order.
pub fn result_ids(body: &serde_json::Value) -> Vec<String> {
    body["results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .filter_map(|r| r["document"]["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
