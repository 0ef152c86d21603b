use async_trait::async_trait;

use crate::error::AppError;
use crate::models::document::Document;

/// Document store operations.
///
/// The store is the system of record. The search index is derived from it
/// and can always be rebuilt from `find_all`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document, replacing any previous version with the same id.
    async fn save(&self, doc: Document) -> Result<Document, AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Document>, AppError>;

    async fn find_all(&self) -> Result<Vec<Document>, AppError>;

    /// Documents whose category equals `category` exactly.
    async fn find_by_category(&self, category: &str) -> Result<Vec<Document>, AppError>;

    /// Overwrite an existing document. Fails with `NotFound` if the id is
    /// not stored.
    async fn update(&self, doc: Document) -> Result<Document, AppError>;

    /// Remove a document. Deleting a missing id is not an error.
    async fn delete_by_id(&self, id: &str) -> Result<(), AppError>;

    async fn count(&self) -> Result<u64, AppError>;
}
