use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::state::AppState;

/// Build the HTTP router with all API routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Search
        .route(
            "/api/search",
            post(api::search::search_handler).get(api::search::search_simple_handler),
        )
        .route(
            "/api/search/fields",
            get(api::search::search_in_fields_handler),
        )
        .route(
            "/api/search/similar-content",
            post(api::search::similar_content_handler),
        )
        .route(
            "/api/search/advanced",
            post(api::search::advanced_search_handler),
        )
        .route("/api/search/full-text", get(api::search::full_text_handler))
        .route("/api/search/term", get(api::search::term_handler))
        // Document management
        .route(
            "/api/documents",
            post(api::documents::create_document_handler)
                .get(api::documents::list_documents_handler),
        )
        .route(
            "/api/documents/count",
            get(api::documents::count_documents_handler),
        )
        .route(
            "/api/documents/{id}",
            get(api::documents::get_document_handler)
                .put(api::documents::update_document_handler)
                .delete(api::documents::delete_document_handler),
        )
        // Indexing triggers
        .route(
            "/api/indexing/index-new",
            post(api::indexing::index_new_handler),
        )
        .route(
            "/api/indexing/index-by-category",
            post(api::indexing::index_by_category_handler),
        )
        .route(
            "/api/indexing/index-document",
            post(api::indexing::index_document_handler),
        )
        .route(
            "/api/indexing/reindex-all",
            post(api::indexing::reindex_all_handler),
        )
        .route("/api/indexing/health", get(api::indexing::health_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
