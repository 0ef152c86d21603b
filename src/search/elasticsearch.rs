//! Elasticsearch implementation of [`SearchIndex`].

use std::time::Duration;

use async_trait::async_trait;
use elasticsearch::auth::Credentials;
use elasticsearch::http::response::Response;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::indices::{
    IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts, IndicesRefreshParts,
};
use elasticsearch::{CountParts, DeleteParts, Elasticsearch, GetParts, IndexParts, SearchParts};
use serde_json::{json, Value};

use crate::config::ElasticsearchConfig;
use crate::error::AppError;
use crate::models::document::Document;
use crate::models::search::SearchResult;
use crate::search::client::SearchIndex;
use crate::search::query::StructuredQuery;

const DATE_FORMAT: &str = "strict_date_optional_time||epoch_millis";

/// Index settings and explicit field mapping.
pub fn index_mapping(config: &ElasticsearchConfig) -> Value {
    json!({
        "settings": {
            "number_of_shards": config.number_of_shards,
            "number_of_replicas": config.number_of_replicas,
            "max_result_window": config.max_result_window,
        },
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "title": {
                    "type": "text",
                    "fields": { "keyword": { "type": "keyword", "ignore_above": 256 } }
                },
                "content": { "type": "text" },
                "category": { "type": "keyword" },
                "author": {
                    "type": "text",
                    "fields": { "keyword": { "type": "keyword", "ignore_above": 256 } }
                },
                "metadata": { "type": "object", "dynamic": true },
                "createdAt": { "type": "date", "format": DATE_FORMAT },
                "updatedAt": { "type": "date", "format": DATE_FORMAT }
            }
        }
    })
}

pub struct ElasticsearchIndex {
    client: Elasticsearch,
    index_name: String,
    mapping: Value,
}

fn index_err(context: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Index(format!("{context}: {e}"))
}

impl ElasticsearchIndex {
    pub fn new(config: &ElasticsearchConfig) -> Result<Self, AppError> {
        let url: elasticsearch::http::Url = config
            .url
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid elasticsearch.url: {e}")))?;

        let mut builder = TransportBuilder::new(SingleNodeConnectionPool::new(url))
            .timeout(Duration::from_millis(config.request_timeout_ms));

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.auth(Credentials::Basic(user.clone(), pass.clone()));
        }

        let transport = builder
            .build()
            .map_err(|e| index_err("Failed to build transport", e))?;

        Ok(Self {
            client: Elasticsearch::new(transport),
            index_name: config.index_name.clone(),
            mapping: index_mapping(config),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Turn a non-2xx response into an error carrying the response body.
    async fn fail(context: &str, response: Response) -> AppError {
        let status = response.status_code();
        let body = response.text().await.unwrap_or_default();
        AppError::Index(format!("{context} (status {status}): {body}"))
    }
}

/// Map a failed `_search` or `_count` response to an error.
///
/// A 400 caused by query parsing is the caller's input (for example
/// unbalanced query-string syntax), not an index fault.
pub fn search_failure(context: &str, status: u16, body: &str) -> AppError {
    const QUERY_ERRORS: &[&str] = &[
        "query_shard_exception",
        "parse_exception",
        "parsing_exception",
    ];
    if status == 400 && QUERY_ERRORS.iter().any(|kind| body.contains(kind)) {
        return AppError::Validation(format!("Query could not be parsed: {body}"));
    }
    AppError::Index(format!("{context} (status {status}): {body}"))
}

/// Convert one `hits.hits[]` entry into a result.
///
/// A hit whose `_source` is missing or does not decode yields a result with
/// no document rather than failing the whole page.
pub fn parse_hit(hit: &Value) -> SearchResult {
    let document = hit.get("_source").and_then(|source| {
        match serde_json::from_value::<Document>(source.clone()) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::warn!(
                    id = hit.get("_id").and_then(serde_json::Value::as_str).unwrap_or_default(),
                    "Undecodable search hit source: {}",
                    e
                );
                None
            }
        }
    });

    let score = hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0) as f32;

    let highlight = hit
        .get("highlight")
        .and_then(Value::as_object)
        .map(|fields| {
            fields
                .values()
                .filter_map(Value::as_array)
                .flatten()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    SearchResult {
        document,
        score,
        highlight,
    }
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn create_index(&self) -> Result<(), AppError> {
        let exists = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[&self.index_name]))
            .send()
            .await
            .map_err(|e| index_err("Failed to check index existence", e))?;

        if exists.status_code().is_success() {
            return Ok(());
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&self.index_name))
            .body(self.mapping.clone())
            .send()
            .await
            .map_err(|e| index_err("Failed to create index", e))?;

        if !response.status_code().is_success() {
            let status = response.status_code();
            let body = response.text().await.unwrap_or_default();
            // Lost a race with another creator.
            if body.contains("resource_already_exists_exception") {
                return Ok(());
            }
            return Err(AppError::Index(format!(
                "Failed to create index {} (status {status}): {body}",
                self.index_name
            )));
        }

        tracing::info!(index = %self.index_name, "Created search index");
        Ok(())
    }

    async fn delete_index(&self) -> Result<(), AppError> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[&self.index_name]))
            .send()
            .await
            .map_err(|e| index_err("Failed to delete index", e))?;

        if !response.status_code().is_success() {
            let status = response.status_code();
            let body = response.text().await.unwrap_or_default();
            if !body.contains("index_not_found_exception") {
                return Err(AppError::Index(format!(
                    "Failed to delete index {} (status {status}): {body}",
                    self.index_name
                )));
            }
        }

        tracing::info!(index = %self.index_name, "Deleted search index");
        Ok(())
    }

    async fn index_document(&self, doc: &Document) -> Result<(), AppError> {
        let body = serde_json::to_value(doc).map_err(|e| index_err("Failed to encode document", e))?;

        let response = self
            .client
            .index(IndexParts::IndexId(&self.index_name, &doc.id))
            .body(body)
            .send()
            .await
            .map_err(|e| index_err("Failed to index document", e))?;

        if !response.status_code().is_success() {
            return Err(Self::fail(&format!("Failed to index document '{}'", doc.id), response).await);
        }
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Document>, AppError> {
        let response = self
            .client
            .get(GetParts::IndexId(&self.index_name, id))
            .send()
            .await
            .map_err(|e| index_err("Failed to fetch document", e))?;

        if response.status_code().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status_code().is_success() {
            return Err(Self::fail(&format!("Failed to fetch document '{id}'"), response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| index_err("Failed to parse get response", e))?;

        match body.get("_source") {
            Some(source) => serde_json::from_value(source.clone())
                .map(Some)
                .map_err(|e| index_err(&format!("Failed to decode document '{id}'"), e)),
            None => Ok(None),
        }
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), AppError> {
        let response = self
            .client
            .delete(DeleteParts::IndexId(&self.index_name, id))
            .send()
            .await
            .map_err(|e| index_err("Failed to delete document", e))?;

        let status = response.status_code();
        if !status.is_success() && status.as_u16() != 404 {
            return Err(Self::fail(&format!("Failed to delete document '{id}'"), response).await);
        }
        Ok(())
    }

    async fn query(&self, query: &StructuredQuery) -> Result<Vec<SearchResult>, AppError> {
        let response = self
            .client
            .search(SearchParts::Index(&[&self.index_name]))
            .body(query.search_body())
            .send()
            .await
            .map_err(|e| index_err("Search failed", e))?;

        if !response.status_code().is_success() {
            let status = response.status_code();
            let body = response.text().await.unwrap_or_default();
            // Between drop and recreate during a rebuild.
            if body.contains("index_not_found_exception") {
                return Ok(vec![]);
            }
            return Err(search_failure("Search failed", status.as_u16(), &body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| index_err("Failed to parse search response", e))?;

        Ok(body
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .map(|hits| hits.iter().map(parse_hit).collect())
            .unwrap_or_default())
    }

    async fn count(&self, query: &StructuredQuery) -> Result<u64, AppError> {
        let response = self
            .client
            .count(CountParts::Index(&[&self.index_name]))
            .body(query.count_body())
            .send()
            .await
            .map_err(|e| index_err("Count failed", e))?;

        if !response.status_code().is_success() {
            let status = response.status_code();
            let body = response.text().await.unwrap_or_default();
            if body.contains("index_not_found_exception") {
                return Ok(0);
            }
            return Err(search_failure("Count failed", status.as_u16(), &body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| index_err("Failed to parse count response", e))?;

        Ok(body.get("count").and_then(Value::as_u64).unwrap_or(0))
    }

    async fn refresh(&self) -> Result<(), AppError> {
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[&self.index_name]))
            .send()
            .await
            .map_err(|e| index_err("Refresh failed", e))?;

        if !response.status_code().is_success() {
            let status = response.status_code();
            let body = response.text().await.unwrap_or_default();
            if body.contains("index_not_found_exception") {
                return Ok(());
            }
            return Err(AppError::Index(format!("Refresh failed (status {status}): {body}")));
        }
        Ok(())
    }
}
