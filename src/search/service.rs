use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::error::AppError;
use crate::models::search::{Paging, SearchRequest, SearchResponse};
use crate::search::client::SearchIndex;
use crate::search::query::{translate, MatchType, SearchKind, TermCondition};

/// Runs translated queries against the index and assembles paged responses.
#[derive(Clone)]
pub struct SearchService {
    index: Arc<dyn SearchIndex>,
    max_result_window: u64,
}

impl SearchService {
    pub fn new(index: Arc<dyn SearchIndex>, max_result_window: u64) -> Self {
        Self {
            index,
            max_result_window,
        }
    }

    /// Translate and run one page of a search.
    ///
    /// Results and total count are fetched concurrently; if either fails the
    /// whole search fails.
    pub async fn execute(
        &self,
        kind: &SearchKind,
        paging: Paging,
    ) -> Result<SearchResponse, AppError> {
        let started = Instant::now();
        paging.validate(self.max_result_window)?;
        let query = translate(kind, paging)?;

        let (mut results, total_hits) =
            tokio::try_join!(self.index.query(&query), self.index.count(&query))?;
        results.truncate(paging.size as usize);

        let search_time_millis = started.elapsed().as_millis() as u64;
        tracing::debug!(
            hits = results.len(),
            total_hits,
            search_time_millis,
            "Search executed"
        );

        Ok(SearchResponse {
            results,
            total_hits,
            page: paging.page,
            size: paging.size,
            search_time_millis,
            timestamp: Utc::now(),
        })
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, AppError> {
        request.validate()?;
        self.execute(&SearchKind::from(request), request.paging())
            .await
    }

    /// Free-text search over the default fields.
    pub async fn search_simple(
        &self,
        query: &str,
        paging: Paging,
    ) -> Result<SearchResponse, AppError> {
        let mut request = SearchRequest::new(query);
        request.page = paging.page;
        request.size = paging.size;
        self.search(&request).await
    }

    pub async fn search_in_fields(
        &self,
        query: &str,
        fields: Vec<String>,
        paging: Paging,
    ) -> Result<SearchResponse, AppError> {
        let mut request = SearchRequest::new(query);
        request.fields = fields;
        request.page = paging.page;
        request.size = paging.size;
        self.search(&request).await
    }

    pub async fn similar_content(
        &self,
        text: &str,
        paging: Paging,
    ) -> Result<SearchResponse, AppError> {
        let kind = SearchKind::SimilarContent {
            text: text.to_string(),
        };
        self.execute(&kind, paging).await
    }

    pub async fn full_text(
        &self,
        query: &str,
        fields: Vec<String>,
        match_type: MatchType,
        paging: Paging,
    ) -> Result<SearchResponse, AppError> {
        let kind = SearchKind::FullText {
            query: query.to_string(),
            fields,
            match_type,
        };
        self.execute(&kind, paging).await
    }

    pub async fn term_level(
        &self,
        field: &str,
        condition: TermCondition,
        paging: Paging,
    ) -> Result<SearchResponse, AppError> {
        let kind = SearchKind::TermLevel {
            field: field.to_string(),
            condition,
        };
        self.execute(&kind, paging).await
    }

    /// Same as [`SearchService::search`].
    pub async fn advanced_search(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchResponse, AppError> {
        self.search(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::search::SearchResult;
    use crate::search::client::MockSearchIndex;

    fn hit(score: f32) -> SearchResult {
        SearchResult {
            document: None,
            score,
            highlight: vec![],
        }
    }

    #[tokio::test]
    async fn test_merges_results_and_count() {
        let mut index = MockSearchIndex::new();
        index
            .expect_query()
            .times(1)
            .returning(|_| Ok((0..10).map(|i| hit(i as f32)).collect()));
        index.expect_count().times(1).returning(|_| Ok(25));

        let service = SearchService::new(Arc::new(index), 10_000);
        let resp = service
            .search(&SearchRequest::new("test"))
            .await
            .unwrap();
        assert_eq!(resp.results.len(), 10);
        assert_eq!(resp.total_hits, 25);
        assert_eq!(resp.page, 0);
        assert_eq!(resp.size, 10);
    }

    #[tokio::test]
    async fn test_results_are_truncated_to_page_size() {
        let mut index = MockSearchIndex::new();
        index
            .expect_query()
            .returning(|_| Ok((0..8).map(|i| hit(i as f32)).collect()));
        index.expect_count().returning(|_| Ok(8));

        let service = SearchService::new(Arc::new(index), 10_000);
        let resp = service
            .search_simple("test", Paging::new(0, 5))
            .await
            .unwrap();
        assert_eq!(resp.results.len(), 5);
    }

    #[tokio::test]
    async fn test_failed_count_fails_search() {
        let mut index = MockSearchIndex::new();
        index.expect_query().returning(|_| Ok(vec![hit(1.0)]));
        index
            .expect_count()
            .returning(|_| Err(AppError::Index("timeout".into())));

        let service = SearchService::new(Arc::new(index), 10_000);
        let res = service.search_simple("test", Paging::default()).await;
        assert!(matches!(res, Err(AppError::Index(_))));
    }

    #[tokio::test]
    async fn test_invalid_requests_never_reach_the_index() {
        // No expectations: any backend call panics.
        let service = SearchService::new(Arc::new(MockSearchIndex::new()), 10_000);

        assert!(matches!(
            service.search_simple("   ", Paging::default()).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.search_simple("test", Paging::new(0, 0)).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.search_simple("test", Paging::new(1000, 10)).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service
                .full_text("test", vec![], MatchType::Match, Paging::default())
                .await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_term_level_passes_structured_query() {
        let mut index = MockSearchIndex::new();
        index
            .expect_query()
            .withf(|q| {
                q.highlight.is_none()
                    && q.query.to_dsl()["prefix"]["author"]["value"] == "ad"
                    && q.from == 20
            })
            .returning(|_| Ok(vec![]));
        index.expect_count().returning(|_| Ok(0));

        let service = SearchService::new(Arc::new(index), 10_000);
        let resp = service
            .term_level(
                "author",
                TermCondition::Prefix("ad".into()),
                Paging::new(2, 10),
            )
            .await
            .unwrap();
        assert_eq!(resp.total_hits, 0);
        assert_eq!(resp.page, 2);
    }
}
