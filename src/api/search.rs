use axum::extract::{Query, State};
use axum::Json;
use axum_extra::extract::WithRejection;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::search::{Paging, SearchRequest, SearchResponse, DEFAULT_PAGE_SIZE};
use crate::search::query::{MatchType, TermCondition, TermType};
use crate::state::AppState;

fn default_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
}

impl PageParams {
    fn paging(&self) -> Paging {
        Paging::new(self.page, self.size)
    }
}

#[derive(Debug, Deserialize)]
pub struct SimpleSearchParams {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub fields: Option<String>,
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullTextParams {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub fields: Option<String>,
    pub match_type: Option<String>,
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
}

#[derive(Debug, Deserialize)]
pub struct TermParams {
    #[serde(default)]
    pub field: String,
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub term_type: Option<String>,
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
}

/// Split a comma-separated field list, keeping caller order.
pub fn parse_field_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// POST /api/search
pub async fn search_handler(
    State(state): State<AppState>,
    WithRejection(Json(request), _): WithRejection<Json<SearchRequest>, AppError>,
) -> Result<Json<SearchResponse>, AppError> {
    state.search.search(&request).await.map(Json)
}

/// GET /api/search?query=&page=&size=
pub async fn search_simple_handler(
    State(state): State<AppState>,
    WithRejection(Query(params), _): WithRejection<Query<SimpleSearchParams>, AppError>,
) -> Result<Json<SearchResponse>, AppError> {
    state
        .search
        .search_simple(&params.query, Paging::new(params.page, params.size))
        .await
        .map(Json)
}

/// GET /api/search/fields?query=&fields=a,b&page=&size=
pub async fn search_in_fields_handler(
    State(state): State<AppState>,
    WithRejection(Query(params), _): WithRejection<Query<SimpleSearchParams>, AppError>,
) -> Result<Json<SearchResponse>, AppError> {
    let fields = parse_field_list(params.fields.as_deref());
    if fields.is_empty() {
        return Err(AppError::Validation("At least one field is required".into()));
    }
    state
        .search
        .search_in_fields(&params.query, fields, Paging::new(params.page, params.size))
        .await
        .map(Json)
}

/// POST /api/search/similar-content?page=&size= with the reference text as body.
pub async fn similar_content_handler(
    State(state): State<AppState>,
    WithRejection(Query(params), _): WithRejection<Query<PageParams>, AppError>,
    text: String,
) -> Result<Json<SearchResponse>, AppError> {
    state
        .search
        .similar_content(&text, params.paging())
        .await
        .map(Json)
}

/// POST /api/search/advanced
pub async fn advanced_search_handler(
    State(state): State<AppState>,
    WithRejection(Json(request), _): WithRejection<Json<SearchRequest>, AppError>,
) -> Result<Json<SearchResponse>, AppError> {
    state.search.advanced_search(&request).await.map(Json)
}

/// GET /api/search/full-text?query=&fields=&matchType=&page=&size=
pub async fn full_text_handler(
    State(state): State<AppState>,
    WithRejection(Query(params), _): WithRejection<Query<FullTextParams>, AppError>,
) -> Result<Json<SearchResponse>, AppError> {
    let match_type = match params.match_type.as_deref() {
        Some(raw) => MatchType::from_str_ci(raw)?,
        None => MatchType::default(),
    };
    state
        .search
        .full_text(
            &params.query,
            parse_field_list(params.fields.as_deref()),
            match_type,
            Paging::new(params.page, params.size),
        )
        .await
        .map(Json)
}

/// GET /api/search/term?field=&value=&type=&page=&size=
pub async fn term_handler(
    State(state): State<AppState>,
    WithRejection(Query(params), _): WithRejection<Query<TermParams>, AppError>,
) -> Result<Json<SearchResponse>, AppError> {
    let term_type = match params.term_type.as_deref() {
        Some(raw) => TermType::from_str_ci(raw)?,
        None => TermType::default(),
    };
    let condition = TermCondition::parse(term_type, params.value.as_deref())?;
    state
        .search
        .term_level(&params.field, condition, Paging::new(params.page, params.size))
        .await
        .map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_list() {
        assert_eq!(
            parse_field_list(Some("content, title,,author")),
            vec!["content", "title", "author"]
        );
        assert!(parse_field_list(Some(" , ")).is_empty());
        assert!(parse_field_list(None).is_empty());
    }
}
