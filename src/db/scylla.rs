use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use cdrs_tokio::authenticators::{
    NoneAuthenticatorProvider, SaslAuthenticatorProvider, StaticPasswordAuthenticatorProvider,
};
use cdrs_tokio::cluster::session::{Session, SessionBuilder, TcpSessionBuilder};
use cdrs_tokio::cluster::{NodeAddress, NodeTcpConfigBuilder, TcpConnectionManager};
use cdrs_tokio::frame::Envelope;
use cdrs_tokio::load_balancing::RoundRobinLoadBalancingStrategy;
use cdrs_tokio::query::PreparedQuery;
use cdrs_tokio::query_values;
use cdrs_tokio::transport::TransportTcp;
use cdrs_tokio::types::rows::Row;
use cdrs_tokio::types::IntoRustByName;
use chrono::{DateTime, Utc};

use crate::config::ScyllaConfig;
use crate::db::repository::DocumentStore;
use crate::db::schema::{self, COLUMNS};
use crate::error::AppError;
use crate::models::document::Document;

/// Shared CQL session with round-robin node selection.
pub type CqlSession = Session<
    TransportTcp,
    TcpConnectionManager,
    RoundRobinLoadBalancingStrategy<TransportTcp, TcpConnectionManager>,
>;

/// ScyllaDB implementation of [`DocumentStore`].
///
/// Metadata is persisted as JSON text; timestamps as CQL `timestamp`.
pub struct ScyllaDocumentStore {
    session: Arc<CqlSession>,
    table: String,
    insert: PreparedQuery,
    select_by_id: PreparedQuery,
    select_by_category: PreparedQuery,
    delete_by_id: PreparedQuery,
}

fn store_err(e: impl std::fmt::Display) -> AppError {
    AppError::Store(e.to_string())
}

impl ScyllaDocumentStore {
    /// Connect to the cluster, bootstrap the schema if configured, and
    /// prepare the statements used on the hot path.
    pub async fn connect(config: &ScyllaConfig) -> Result<Self, AppError> {
        let authenticator: Arc<dyn SaslAuthenticatorProvider + Send + Sync> =
            match (&config.username, &config.password) {
                (Some(user), Some(pass)) => {
                    Arc::new(StaticPasswordAuthenticatorProvider::new(user, pass))
                }
                _ => Arc::new(NoneAuthenticatorProvider),
            };

        let node_config = NodeTcpConfigBuilder::new()
            .with_contact_points(
                config
                    .contact_points
                    .iter()
                    .map(|p| NodeAddress::from(p.clone()))
                    .collect(),
            )
            .with_authenticator_provider(authenticator)
            .build()
            .await
            .map_err(store_err)?;

        let session: CqlSession =
            TcpSessionBuilder::new(RoundRobinLoadBalancingStrategy::new(), node_config)
                .build()
                .await
                .map_err(store_err)?;

        tracing::info!(
            contact_points = ?config.contact_points,
            keyspace = %config.keyspace,
            "Connected to ScyllaDB"
        );

        if config.auto_create_schema {
            schema::ensure_schema(&session, config).await?;
        }

        Self::with_session(Arc::new(session), &config.keyspace).await
    }

    /// Build a store over an existing session. The table must exist.
    pub async fn with_session(session: Arc<CqlSession>, keyspace: &str) -> Result<Self, AppError> {
        let table = schema::qualified_table(keyspace);

        let insert = session
            .prepare(format!(
                "INSERT INTO {table} ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .await
            .map_err(store_err)?;
        let select_by_id = session
            .prepare(format!("SELECT {COLUMNS} FROM {table} WHERE id = ?"))
            .await
            .map_err(store_err)?;
        // Low-cardinality lookup through the secondary index.
        let select_by_category = session
            .prepare(format!(
                "SELECT {COLUMNS} FROM {table} WHERE category = ? ALLOW FILTERING"
            ))
            .await
            .map_err(store_err)?;
        let delete_by_id = session
            .prepare(format!("DELETE FROM {table} WHERE id = ?"))
            .await
            .map_err(store_err)?;

        Ok(Self {
            session,
            table,
            insert,
            select_by_id,
            select_by_category,
            delete_by_id,
        })
    }

    async fn write(&self, doc: &Document) -> Result<(), AppError> {
        let metadata = serde_json::to_string(&doc.metadata).map_err(store_err)?;
        self.session
            .exec_with_values(
                &self.insert,
                query_values!(
                    doc.id.clone(),
                    doc.title.clone(),
                    doc.content.clone(),
                    doc.category.clone(),
                    doc.author.clone(),
                    metadata,
                    doc.created_at.timestamp_millis(),
                    doc.updated_at.timestamp_millis()
                ),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

fn rows(envelope: Envelope) -> Result<Vec<Row>, AppError> {
    Ok(envelope
        .response_body()
        .map_err(store_err)?
        .into_rows()
        .unwrap_or_default())
}

fn timestamp(row: &Row, column: &str) -> Result<DateTime<Utc>, AppError> {
    let millis: i64 = row.get_r_by_name(column).map_err(store_err)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| AppError::Store(format!("Column '{column}' out of range: {millis}")))
}

/// Map a result row to a document.
fn row_to_document(row: &Row) -> Result<Document, AppError> {
    let id: String = row.get_r_by_name("id").map_err(store_err)?;
    let title: Option<String> = row.get_by_name("title").map_err(store_err)?;
    let content: Option<String> = row.get_by_name("content").map_err(store_err)?;
    let category: Option<String> = row.get_by_name("category").map_err(store_err)?;
    let author: Option<String> = row.get_by_name("author").map_err(store_err)?;
    let metadata_json: Option<String> = row.get_by_name("metadata").map_err(store_err)?;

    let metadata = match metadata_json.as_deref() {
        Some(raw) if !raw.is_empty() => serde_json::from_str::<BTreeMap<String, serde_json::Value>>(raw)
            .map_err(|e| AppError::Store(format!("Invalid metadata for document '{id}': {e}")))?,
        _ => BTreeMap::new(),
    };

    Ok(Document {
        title: title.unwrap_or_default(),
        content: content.unwrap_or_default(),
        category,
        author,
        metadata,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
        id,
    })
}

#[async_trait]
impl DocumentStore for ScyllaDocumentStore {
    async fn save(&self, doc: Document) -> Result<Document, AppError> {
        doc.validate()?;
        self.write(&doc).await?;
        tracing::debug!(id = %doc.id, "Document saved");
        Ok(doc)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Document>, AppError> {
        let envelope = self
            .session
            .exec_with_values(&self.select_by_id, query_values!(id.to_string()))
            .await
            .map_err(store_err)?;

        rows(envelope)?.first().map(row_to_document).transpose()
    }

    async fn find_all(&self) -> Result<Vec<Document>, AppError> {
        let envelope = self
            .session
            .query(format!("SELECT {COLUMNS} FROM {}", self.table))
            .await
            .map_err(store_err)?;

        rows(envelope)?.iter().map(row_to_document).collect()
    }

    async fn find_by_category(&self, category: &str) -> Result<Vec<Document>, AppError> {
        let envelope = self
            .session
            .exec_with_values(&self.select_by_category, query_values!(category.to_string()))
            .await
            .map_err(store_err)?;

        rows(envelope)?.iter().map(row_to_document).collect()
    }

    async fn update(&self, doc: Document) -> Result<Document, AppError> {
        doc.validate()?;
        if self.find_by_id(&doc.id).await?.is_none() {
            return Err(AppError::NotFound(format!("Document '{}' not found", doc.id)));
        }
        self.write(&doc).await?;
        tracing::debug!(id = %doc.id, "Document updated");
        Ok(doc)
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), AppError> {
        self.session
            .exec_with_values(&self.delete_by_id, query_values!(id.to_string()))
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn count(&self) -> Result<u64, AppError> {
        let envelope = self
            .session
            .query(format!("SELECT COUNT(*) FROM {}", self.table))
            .await
            .map_err(store_err)?;

        let count: i64 = match rows(envelope)?.first() {
            Some(row) => row.get_r_by_name("count").map_err(store_err)?,
            None => 0,
        };
        Ok(count.max(0) as u64)
    }
}
