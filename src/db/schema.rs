//! CQL schema for the document table.
//!
//! Everything is created with `IF NOT EXISTS`, so bootstrapping an already
//! provisioned cluster is a no-op.

use crate::config::ScyllaConfig;
use crate::db::scylla::CqlSession;
use crate::error::AppError;

pub const TABLE_NAME: &str = "documents";
pub const CATEGORY_INDEX_NAME: &str = "documents_category_idx";

/// Column list shared by every SELECT, in insert order.
pub const COLUMNS: &str = "id, title, content, category, author, metadata, created_at, updated_at";

pub fn qualified_table(keyspace: &str) -> String {
    format!("{keyspace}.{TABLE_NAME}")
}

pub fn create_keyspace_cql(keyspace: &str, replication_factor: u32) -> String {
    format!(
        "CREATE KEYSPACE IF NOT EXISTS {keyspace} WITH replication = \
         {{'class': 'SimpleStrategy', 'replication_factor': {replication_factor}}}"
    )
}

pub fn create_table_cql(keyspace: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
         id text PRIMARY KEY, \
         title text, \
         content text, \
         category text, \
         author text, \
         metadata text, \
         created_at timestamp, \
         updated_at timestamp)",
        qualified_table(keyspace)
    )
}

pub fn create_category_index_cql(keyspace: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {CATEGORY_INDEX_NAME} ON {} (category)",
        qualified_table(keyspace)
    )
}

/// Create keyspace, table and the category index.
pub async fn ensure_schema(session: &CqlSession, config: &ScyllaConfig) -> Result<(), AppError> {
    let statements = [
        create_keyspace_cql(&config.keyspace, config.replication_factor),
        create_table_cql(&config.keyspace),
        create_category_index_cql(&config.keyspace),
    ];

    for cql in statements {
        tracing::debug!(%cql, "Applying schema statement");
        session
            .query(cql)
            .await
            .map_err(|e| AppError::Store(format!("Schema bootstrap failed: {e}")))?;
    }

    tracing::info!(keyspace = %config.keyspace, "Document schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyspace_statement() {
        let cql = create_keyspace_cql("search_data_dev", 3);
        assert!(cql.starts_with("CREATE KEYSPACE IF NOT EXISTS search_data_dev"));
        assert!(cql.contains("'class': 'SimpleStrategy'"));
        assert!(cql.contains("'replication_factor': 3"));
    }

    #[test]
    fn test_table_statement_is_keyspace_qualified() {
        let cql = create_table_cql("ks");
        assert!(cql.contains("ks.documents"));
        assert!(cql.contains("id text PRIMARY KEY"));
        assert!(cql.contains("metadata text"));
        assert!(cql.contains("updated_at timestamp"));
    }

    #[test]
    fn test_category_index_statement() {
        assert_eq!(
            create_category_index_cql("ks"),
            "CREATE INDEX IF NOT EXISTS documents_category_idx ON ks.documents (category)"
        );
    }
}
