use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::WithRejection;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::repository::DocumentStore;
use crate::error::AppError;
use crate::models::document::{Document, DocumentPayload};
use crate::state::AppState;
use crate::sync::service::Synchronizer;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub status: String,
    pub message: String,
    pub document: Document,
    /// Whether the search index was updated in the same request.
    pub indexed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResponse {
    pub status: String,
    pub total_documents: u64,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub category: Option<String>,
}

/// Index a freshly written document, downgrading failure to a warning.
///
/// The store write already succeeded; the next sweep picks the document up.
async fn index_after_write(sync: Option<&Synchronizer>, doc: &Document) -> bool {
    let Some(sync) = sync else {
        return false;
    };
    match sync.sync_one(doc).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(id = %doc.id, "Stored document not indexed: {}", e);
            false
        }
    }
}

/// Core create logic, separated from the HTTP layer for testability.
pub async fn process_create(
    store: &dyn DocumentStore,
    sync: Option<&Synchronizer>,
    payload: DocumentPayload,
) -> Result<(Document, bool), AppError> {
    let doc = payload.into_new_document(Utc::now())?;
    let saved = store.save(doc).await?;
    tracing::info!(id = %saved.id, "Document created");
    let indexed = index_after_write(sync, &saved).await;
    Ok((saved, indexed))
}

/// Core update logic. The id and creation time are preserved.
pub async fn process_update(
    store: &dyn DocumentStore,
    sync: Option<&Synchronizer>,
    id: &str,
    payload: DocumentPayload,
) -> Result<(Document, bool), AppError> {
    let existing = store
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Document '{id}' not found")))?;

    let doc = payload.apply_to(&existing, Utc::now())?;
    let saved = store.update(doc).await?;
    tracing::info!(id = %saved.id, "Document updated");
    let indexed = index_after_write(sync, &saved).await;
    Ok((saved, indexed))
}

/// Core delete logic: removes the document from the index, then the store.
///
/// If the store delete fails after the index delete, the next sweep
/// re-indexes the surviving document.
pub async fn process_delete(
    store: &dyn DocumentStore,
    sync: &Synchronizer,
    id: &str,
) -> Result<(), AppError> {
    if store.find_by_id(id).await?.is_none() {
        return Err(AppError::NotFound(format!("Document '{id}' not found")));
    }
    sync.remove_one(id).await?;
    store.delete_by_id(id).await?;
    tracing::info!(id, "Document deleted");
    Ok(())
}

fn write_sync(state: &AppState) -> Option<&Synchronizer> {
    state.index_on_write.then_some(&state.synchronizer)
}

/// POST /api/documents
pub async fn create_document_handler(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<DocumentPayload>, AppError>,
) -> Result<(StatusCode, Json<DocumentResponse>), AppError> {
    let (document, indexed) =
        process_create(state.store.as_ref(), write_sync(&state), payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse {
            status: "success".to_string(),
            message: "Document created successfully".to_string(),
            document,
            indexed,
        }),
    ))
}

/// GET /api/documents?category=
pub async fn list_documents_handler(
    State(state): State<AppState>,
    WithRejection(Query(params), _): WithRejection<Query<ListParams>, AppError>,
) -> Result<Json<Vec<Document>>, AppError> {
    let docs = match params.category.as_deref() {
        Some(category) if !category.trim().is_empty() => {
            state.store.find_by_category(category).await?
        }
        _ => state.store.find_all().await?,
    };
    Ok(Json(docs))
}

/// GET /api/documents/count
pub async fn count_documents_handler(
    State(state): State<AppState>,
) -> Result<Json<CountResponse>, AppError> {
    let total_documents = state.store.count().await?;
    Ok(Json(CountResponse {
        status: "success".to_string(),
        total_documents,
    }))
}

/// GET /api/documents/{id}
pub async fn get_document_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError> {
    state
        .store
        .find_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Document '{id}' not found")))
}

/// PUT /api/documents/{id}
pub async fn update_document_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    WithRejection(Json(payload), _): WithRejection<Json<DocumentPayload>, AppError>,
) -> Result<Json<DocumentResponse>, AppError> {
    let (document, indexed) =
        process_update(state.store.as_ref(), write_sync(&state), &id, payload).await?;
    Ok(Json(DocumentResponse {
        status: "success".to_string(),
        message: "Document updated successfully".to_string(),
        document,
        indexed,
    }))
}

/// DELETE /api/documents/{id}
pub async fn delete_document_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    process_delete(state.store.as_ref(), &state.synchronizer, &id).await?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "message": format!("Document '{id}' deleted successfully"),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::db::memory::InMemoryDocumentStore;
    use crate::search::client::{MockSearchIndex, SearchIndex};
    use crate::search::memory::InMemorySearchIndex;

    fn payload(title: &str) -> DocumentPayload {
        DocumentPayload {
            title: title.to_string(),
            content: "body".to_string(),
            category: Some("news".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_stores_and_indexes() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let index = Arc::new(InMemorySearchIndex::new());
        let sync = Synchronizer::new(store.clone(), index.clone(), 1);

        let (doc, indexed) = process_create(store.as_ref(), Some(&sync), payload("Hello"))
            .await
            .unwrap();
        assert!(indexed);
        assert_eq!(store.find_by_id(&doc.id).await.unwrap(), Some(doc.clone()));
        assert_eq!(index.get_by_id(&doc.id).await.unwrap(), Some(doc));
    }

    #[tokio::test]
    async fn test_create_survives_index_failure() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let mut index = MockSearchIndex::new();
        index
            .expect_index_document()
            .returning(|_| Err(AppError::Index("down".into())));
        let sync = Synchronizer::new(store.clone(), Arc::new(index), 1);

        let (doc, indexed) = process_create(store.as_ref(), Some(&sync), payload("Hello"))
            .await
            .unwrap();
        assert!(!indexed);
        assert!(store.find_by_id(&doc.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_without_index_on_write() {
        let store = InMemoryDocumentStore::new();
        let (_, indexed) = process_create(&store, None, payload("Quiet")).await.unwrap();
        assert!(!indexed);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = InMemoryDocumentStore::new();
        assert!(matches!(
            process_update(&store, None, "nope", payload("x")).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_from_both() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let index = Arc::new(InMemorySearchIndex::new());
        let sync = Synchronizer::new(store.clone(), index.clone(), 1);
        let (doc, _) = process_create(store.as_ref(), Some(&sync), payload("Bye"))
            .await
            .unwrap();

        process_delete(store.as_ref(), &sync, &doc.id).await.unwrap();
        assert!(store.find_by_id(&doc.id).await.unwrap().is_none());
        assert!(index.get_by_id(&doc.id).await.unwrap().is_none());

        assert!(matches!(
            process_delete(store.as_ref(), &sync, &doc.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
