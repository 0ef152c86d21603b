use async_trait::async_trait;

use crate::error::AppError;
use crate::models::document::Document;
use crate::models::search::SearchResult;
use crate::search::query::StructuredQuery;

/// Operations on the search index, enabling mock testing.
///
/// The index holds a derived copy of the document store keyed by document
/// id. Every write is an idempotent upsert or delete, so replaying a sync
/// converges to the same state.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create the index with its mapping. Succeeds if it already exists.
    async fn create_index(&self) -> Result<(), AppError>;

    /// Drop the index. Succeeds if it does not exist.
    async fn delete_index(&self) -> Result<(), AppError>;

    /// Add or replace a document.
    async fn index_document(&self, doc: &Document) -> Result<(), AppError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Document>, AppError>;

    /// Remove a document. Succeeds if it is not indexed.
    async fn delete_by_id(&self, id: &str) -> Result<(), AppError>;

    /// One page of hits for `query`, best first.
    async fn query(&self, query: &StructuredQuery) -> Result<Vec<SearchResult>, AppError>;

    /// Number of documents matching `query`, ignoring its page window.
    async fn count(&self, query: &StructuredQuery) -> Result<u64, AppError>;

    /// Make recent writes visible to searches.
    async fn refresh(&self) -> Result<(), AppError>;
}

#[cfg(test)]
mockall::mock! {
    pub SearchIndex {}
    #[async_trait::async_trait]
    impl SearchIndex for SearchIndex {
        async fn create_index(&self) -> Result<(), AppError>;
        async fn delete_index(&self) -> Result<(), AppError>;
        async fn index_document(&self, doc: &Document) -> Result<(), AppError>;
        async fn get_by_id(&self, id: &str) -> Result<Option<Document>, AppError>;
        async fn delete_by_id(&self, id: &str) -> Result<(), AppError>;
        async fn query(&self, query: &StructuredQuery) -> Result<Vec<SearchResult>, AppError>;
        async fn count(&self, query: &StructuredQuery) -> Result<u64, AppError>;
        async fn refresh(&self) -> Result<(), AppError>;
    }
}
