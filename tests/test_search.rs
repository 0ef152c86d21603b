mod common;

use std::collections::HashSet;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{doc, result_ids, TestEnv};

async fn env_with_tests(n: usize) -> TestEnv {
    let env = TestEnv::start();
    let docs = (0..n)
        .map(|i| {
            doc(
                &format!("doc-{i:02}"),
                &format!("Test document {i}"),
                "Body text for a test run",
                Some("news"),
                i as i64,
            )
        })
        .collect();
    env.seed_indexed(docs).await;
    env
}

#[tokio::test]
async fn test_first_page_reports_total_hits() {
    let env = env_with_tests(25).await;
    let server = env.server();

    let response = server
        .post("/api/search")
        .json(&json!({ "query": "test", "page": 0, "size": 10 }))
        .await;
    response.assert_status_ok();
    let body = response.json::<Value>();

    assert_eq!(body["results"].as_array().unwrap().len(), 10);
    assert_eq!(body["totalHits"], 25);
    assert_eq!(body["page"], 0);
    assert_eq!(body["size"], 10);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_pages_partition_results() {
    let env = env_with_tests(25).await;
    let server = env.server();

    let mut seen = Vec::new();
    for page in 0..3 {
        let body = server
            .get("/api/search")
            .add_query_param("query", "test")
            .add_query_param("page", page)
            .add_query_param("size", 10)
            .await
            .json::<Value>();
        assert_eq!(body["totalHits"], 25);
        seen.extend(result_ids(&body));
    }

    let unique: HashSet<_> = seen.iter().cloned().collect();
    assert_eq!(seen.len(), 25);
    assert_eq!(unique.len(), 25);
}

#[tokio::test]
async fn test_no_matches_is_empty_not_error() {
    let env = env_with_tests(3).await;
    let server = env.server();

    let body = server
        .get("/api/search")
        .add_query_param("query", "nonexistent")
        .await
        .json::<Value>();
    assert_eq!(body["totalHits"], 0);
    assert!(body["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_blank_query_is_rejected() {
    let env = TestEnv::start();
    let server = env.server_permissive();

    let response = server
        .post("/api/search")
        .json(&json!({ "query": "   " }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(body["status"], "error");
    assert_eq!(body["category"], "validation");
}

#[tokio::test]
async fn test_paging_past_result_window_is_rejected() {
    let env = TestEnv::start();
    let server = env.server_permissive();

    let response = server
        .post("/api/search")
        .json(&json!({ "query": "test", "page": 1000, "size": 10 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_filters_restrict_results() {
    let env = TestEnv::start();
    env.seed_indexed(vec![
        doc("n1", "Rust news", "Release notes", Some("news"), 1),
        doc("n2", "More rust", "Compiler news", Some("news"), 2),
        doc("s1", "Rust sports", "A rusty bike race", Some("sports"), 3),
    ])
    .await;
    let server = env.server();

    let body = server
        .post("/api/search")
        .json(&json!({ "query": "rust", "filters": { "category": "news" } }))
        .await
        .json::<Value>();

    assert_eq!(body["totalHits"], 2);
    let mut ids = result_ids(&body);
    ids.sort();
    assert_eq!(ids, vec!["n1", "n2"]);
}

#[tokio::test]
async fn test_explicit_sort_by_created_at() {
    let env = env_with_tests(5).await;
    let server = env.server();

    let body = server
        .post("/api/search")
        .json(&json!({ "query": "test", "sortBy": "createdAt", "sortOrder": "asc" }))
        .await
        .json::<Value>();

    // doc-04 is the oldest.
    assert_eq!(
        result_ids(&body),
        vec!["doc-04", "doc-03", "doc-02", "doc-01", "doc-00"]
    );
}

#[tokio::test]
async fn test_unknown_sort_order_is_rejected() {
    let env = TestEnv::start();
    let server = env.server_permissive();

    let response = server
        .post("/api/search")
        .json(&json!({ "query": "test", "sortBy": "createdAt", "sortOrder": "sideways" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(body["status"], "error");
    assert_eq!(body["category"], "validation");
    assert!(body["message"].as_str().unwrap().contains("sideways"));
}

#[tokio::test]
async fn test_malformed_query_params_use_error_envelope() {
    let env = TestEnv::start();
    let server = env.server_permissive();

    for (name, value) in [("page", "-1"), ("size", "ten")] {
        let response = server
            .get("/api/search")
            .add_query_param("query", "test")
            .add_query_param(name, value)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["category"], "validation");
    }
}

#[tokio::test]
async fn test_malformed_json_body_uses_error_envelope() {
    let env = TestEnv::start();
    let server = env.server_permissive();

    let response = server
        .post("/api/search")
        .text("{\"query\": ")
        .content_type("application/json")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(body["status"], "error");
    assert_eq!(body["category"], "validation");
}

#[tokio::test]
async fn test_search_in_fields() {
    let env = TestEnv::start();
    env.seed_indexed(vec![
        doc("t1", "Tokio guide", "Async runtime", None, 1),
        doc("c1", "Runtime notes", "Working with tokio tasks", None, 2),
    ])
    .await;
    let server = env.server();

    let body = server
        .get("/api/search/fields")
        .add_query_param("query", "tokio")
        .add_query_param("fields", "title")
        .await
        .json::<Value>();
    assert_eq!(result_ids(&body), vec!["t1"]);

    let body = server
        .get("/api/search/fields")
        .add_query_param("query", "tokio")
        .add_query_param("fields", "title,content")
        .await
        .json::<Value>();
    assert_eq!(body["totalHits"], 2);
}

#[tokio::test]
async fn test_search_in_fields_requires_fields() {
    let env = TestEnv::start();
    let server = env.server_permissive();

    let response = server
        .get("/api/search/fields")
        .add_query_param("query", "tokio")
        .add_query_param("fields", " , ")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_highlights_mark_matches() {
    let env = TestEnv::start();
    env.seed_indexed(vec![doc(
        "h1",
        "Highlighting",
        "Search engines highlight matched terms",
        None,
        1,
    )])
    .await;
    let server = env.server();

    let body = server
        .get("/api/search")
        .add_query_param("query", "matched")
        .await
        .json::<Value>();
    let highlight = body["results"][0]["highlight"].as_array().unwrap();
    assert!(highlight
        .iter()
        .any(|h| h.as_str().unwrap().contains("<strong>matched</strong>")));
}

#[tokio::test]
async fn test_similar_content() {
    let env = TestEnv::start();
    env.seed_indexed(vec![
        doc(
            "a",
            "Ownership",
            "Rust ownership and borrowing rules keep memory safe",
            None,
            1,
        ),
        doc(
            "b",
            "Gardening",
            "Tomatoes need sunlight and regular watering",
            None,
            2,
        ),
    ])
    .await;
    let server = env.server();

    let body = server
        .post("/api/search/similar-content")
        .text("borrowing rules in rust keep programs memory safe")
        .await
        .json::<Value>();
    assert_eq!(result_ids(&body), vec!["a"]);
}

#[tokio::test]
async fn test_full_text_match_types() {
    let env = TestEnv::start();
    env.seed_indexed(vec![
        doc("p1", "Phrase", "the quick brown fox", None, 1),
        doc("p2", "Shuffled", "brown the fox quick", None, 2),
    ])
    .await;
    let server = env.server();

    let body = server
        .get("/api/search/full-text")
        .add_query_param("query", "quick brown")
        .add_query_param("fields", "content")
        .add_query_param("matchType", "match_phrase")
        .await
        .json::<Value>();
    assert_eq!(result_ids(&body), vec!["p1"]);

    // Fuzzy match tolerates a transposition.
    let body = server
        .get("/api/search/full-text")
        .add_query_param("query", "quikc")
        .add_query_param("fields", "content")
        .add_query_param("matchType", "MATCH")
        .await
        .json::<Value>();
    assert_eq!(body["totalHits"], 2);
}

#[tokio::test]
async fn test_unknown_match_type_is_unsupported() {
    let env = TestEnv::start();
    let server = env.server_permissive();

    let response = server
        .get("/api/search/full-text")
        .add_query_param("query", "fox")
        .add_query_param("fields", "content")
        .add_query_param("matchType", "regexp")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["category"], "unsupported_query");
}

async fn env_with_categories() -> TestEnv {
    let env = TestEnv::start();
    let mut tagged = doc("x1", "Tagged", "Has a source", Some("news"), 1);
    tagged
        .metadata
        .insert("source".to_string(), json!("wire"));
    env.seed_indexed(vec![
        tagged,
        doc("x2", "Plain", "No source", Some("sports"), 2),
        doc("x3", "Other", "No source either", Some("science"), 3),
    ])
    .await;
    env
}

#[tokio::test]
async fn test_term_level_queries() {
    let env = env_with_categories().await;
    let server = env.server();

    let term = |value: &str, term_type: &str| {
        server
            .get("/api/search/term")
            .add_query_param("field", "category")
            .add_query_param("value", value.to_string())
            .add_query_param("type", term_type.to_string())
    };

    let body = term("news", "term").await.json::<Value>();
    assert_eq!(result_ids(&body), vec!["x1"]);

    let body = term("news,sports,news", "terms").await.json::<Value>();
    let mut ids = result_ids(&body);
    ids.sort();
    assert_eq!(ids, vec!["x1", "x2"]);
    assert_eq!(body["totalHits"], 2);

    let body = term("sc", "prefix").await.json::<Value>();
    assert_eq!(result_ids(&body), vec!["x3"]);

    let body = term("s*s", "wildcard").await.json::<Value>();
    assert_eq!(result_ids(&body), vec!["x2"]);
}

#[tokio::test]
async fn test_exists_ignores_value() {
    let env = env_with_categories().await;
    let server = env.server();

    let body = server
        .get("/api/search/term")
        .add_query_param("field", "metadata.source")
        .add_query_param("type", "exists")
        .await
        .json::<Value>();
    assert_eq!(result_ids(&body), vec!["x1"]);
}

#[tokio::test]
async fn test_unknown_term_type_is_unsupported() {
    let env = TestEnv::start();
    let server = env.server_permissive();

    let response = server
        .get("/api/search/term")
        .add_query_param("field", "category")
        .add_query_param("value", "news")
        .add_query_param("type", "fuzzy")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["category"], "unsupported_query");
}

#[tokio::test]
async fn test_term_requires_value() {
    let env = TestEnv::start();
    let server = env.server_permissive();

    let response = server
        .get("/api/search/term")
        .add_query_param("field", "category")
        .add_query_param("type", "term")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["category"], "validation");
}

#[tokio::test]
async fn test_index_failure_surfaces_as_error() {
    let env = env_with_tests(3).await;
    env.index.set_query_failure(true);
    let server = env.server_permissive();

    let response = server
        .get("/api/search")
        .add_query_param("query", "test")
        .await;
    assert!(response.status_code().is_server_error());
    assert_eq!(response.json::<Value>()["category"], "index");
}
