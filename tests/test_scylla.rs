//! Runs `ScyllaDocumentStore` against a real node. Needs Docker:
//! `cargo test --test test_scylla -- --ignored`

mod common;

use std::time::Duration;

use serde_json::json;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tokio::sync::OnceCell;

use searchgate::config::ScyllaConfig;
use searchgate::db::repository::DocumentStore;
use searchgate::db::scylla::ScyllaDocumentStore;
use searchgate::error::AppError;
use searchgate::models::document::{store_precision, Document};

const SCYLLA_IMAGE: &str = "scylladb/scylla";
const SCYLLA_TAG: &str = "6.2";

struct SharedScylla {
    contact_point: String,
    _container: ContainerAsync<GenericImage>,
}

static SHARED_SCYLLA: OnceCell<SharedScylla> = OnceCell::const_new();

async fn shared_scylla() -> &'static SharedScylla {
    SHARED_SCYLLA
        .get_or_init(|| async {
            let container = GenericImage::new(SCYLLA_IMAGE, SCYLLA_TAG)
                .with_exposed_port(9042.tcp())
                .with_wait_for(WaitFor::message_on_either_std(
                    "Starting listening for CQL clients",
                ))
                .with_cmd([
                    "--smp",
                    "1",
                    "--memory",
                    "512M",
                    "--overprovisioned",
                    "1",
                    "--developer-mode",
                    "1",
                ])
                .with_startup_timeout(Duration::from_secs(180))
                .start()
                .await
                .expect("Failed to start Scylla container");
            let host = container.get_host().await.expect("Failed to get host");
            let port = container
                .get_host_port_ipv4(9042)
                .await
                .expect("Failed to get host port");
            SharedScylla {
                contact_point: format!("{host}:{port}"),
                _container: container,
            }
        })
        .await
}

/// A store in its own keyspace, so tests never see each other's rows.
async fn fresh_store(name: &str) -> ScyllaDocumentStore {
    let scylla = shared_scylla().await;
    let config = ScyllaConfig {
        contact_points: vec![scylla.contact_point.clone()],
        keyspace: format!("searchgate_test_{name}"),
        replication_factor: 1,
        auto_create_schema: true,
        ..Default::default()
    };
    ScyllaDocumentStore::connect(&config)
        .await
        .expect("Failed to connect to Scylla")
}

/// `common::doc` with timestamps the store can hold exactly.
fn stored_doc(id: &str, title: &str, category: Option<&str>, age_days: i64) -> Document {
    let mut doc = common::doc(id, title, "Stored body", category, age_days);
    doc.created_at = store_precision(doc.created_at);
    doc.updated_at = store_precision(doc.updated_at);
    doc
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_save_and_find_by_id() {
    let store = fresh_store("crud").await;

    let mut doc = stored_doc("s1", "First", Some("news"), 2);
    doc.author = Some("ada".to_string());
    store.save(doc.clone()).await.unwrap();

    let fetched = store.find_by_id("s1").await.unwrap().unwrap();
    assert_eq!(fetched, doc);
    assert!(store.find_by_id("absent").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_unaligned_timestamps_come_back_as_millis() {
    let store = fresh_store("millis").await;

    let mut doc = stored_doc("t1", "Timestamps", None, 0);
    doc.created_at += chrono::Duration::nanoseconds(456_789);
    doc.updated_at = doc.created_at;
    store.save(doc.clone()).await.unwrap();

    let fetched = store.find_by_id("t1").await.unwrap().unwrap();
    assert_eq!(fetched.created_at, store_precision(doc.created_at));
    assert_eq!(fetched.updated_at, fetched.created_at);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_metadata_round_trip() {
    let store = fresh_store("metadata").await;

    let mut doc = stored_doc("m1", "Metadata", None, 1);
    doc.metadata.insert("priority".to_string(), json!(3));
    doc.metadata.insert("ratio".to_string(), json!(0.25));
    doc.metadata.insert("reviewed".to_string(), json!(null));
    doc.metadata.insert(
        "source".to_string(),
        json!({ "feed": "wire", "tags": ["a", "b"], "depth": { "level": 2 } }),
    );
    store.save(doc.clone()).await.unwrap();

    let fetched = store.find_by_id("m1").await.unwrap().unwrap();
    assert_eq!(fetched.metadata, doc.metadata);
    assert!(fetched.metadata["reviewed"].is_null());
    assert_eq!(fetched.metadata["source"]["depth"]["level"], 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_find_by_category() {
    let store = fresh_store("category").await;
    let seeds = [
        ("n1", Some("news")),
        ("n2", Some("news")),
        ("s1", Some("sports")),
        ("u1", None),
    ];
    for (id, category) in seeds {
        store.save(stored_doc(id, id, category, 1)).await.unwrap();
    }

    let mut ids: Vec<_> = store
        .find_by_category("news")
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["n1", "n2"]);
    assert!(store.find_by_category("weather").await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_update_overwrites_existing_only() {
    let store = fresh_store("update").await;
    store.save(stored_doc("u1", "Draft", None, 1)).await.unwrap();

    let mut changed = stored_doc("u1", "Final", None, 1);
    changed.content = "Rewritten".to_string();
    store.update(changed.clone()).await.unwrap();
    assert_eq!(store.find_by_id("u1").await.unwrap().unwrap().title, "Final");

    let missing = store.update(stored_doc("ghost", "Ghost", None, 1)).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
    assert!(store.find_by_id("ghost").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_delete_count_and_find_all() {
    let store = fresh_store("delete").await;
    for i in 0..5 {
        store
            .save(stored_doc(&format!("d{i}"), "Doc", None, i))
            .await
            .unwrap();
    }
    assert_eq!(store.count().await.unwrap(), 5);
    assert_eq!(store.find_all().await.unwrap().len(), 5);

    store.delete_by_id("d3").await.unwrap();
    assert!(store.find_by_id("d3").await.unwrap().is_none());
    assert_eq!(store.count().await.unwrap(), 4);

    // Deleting again is not an error.
    store.delete_by_id("d3").await.unwrap();
    assert_eq!(store.find_all().await.unwrap().len(), 4);
}
