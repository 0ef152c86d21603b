//! Runtime configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables. Environment keys use the `SEARCHGATE_` prefix and
//! `__` between section and key:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `SEARCHGATE_SERVER__HOST` | 0.0.0.0 |
//! | `SEARCHGATE_SERVER__PORT` | 8080 |
//! | `SEARCHGATE_BACKEND` | scylla_elasticsearch |
//! | `SEARCHGATE_SCYLLA__CONTACT_POINTS` | 127.0.0.1:9042 (comma-separated) |
//! | `SEARCHGATE_SCYLLA__KEYSPACE` | search_data |
//! | `SEARCHGATE_ELASTICSEARCH__URL` | http://localhost:9200 |
//! | `SEARCHGATE_ELASTICSEARCH__INDEX_NAME` | search_documents |
//! | `SEARCHGATE_SYNC__INTERVAL_SECS` | 3600 |
//! | `SEARCHGATE_LOG_FILTER` | searchgate=info,tower_http=info |

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Name of the config file picked up from the working directory when no
/// explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "searchgate";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendMode,
    pub scylla: ScyllaConfig,
    pub elasticsearch: ElasticsearchConfig,
    pub sync: SyncConfig,
    pub log_filter: String,
}

/// Which store and index implementations to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    #[default]
    ScyllaElasticsearch,
    /// Process-local store and index. Nothing survives a restart.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScyllaConfig {
    /// `host:port` pairs.
    pub contact_points: Vec<String>,
    pub keyspace: String,
    /// Used only when the keyspace is created on startup.
    pub replication_factor: u32,
    /// Create keyspace, table and secondary indexes if missing.
    pub auto_create_schema: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ScyllaConfig {
    fn default() -> Self {
        Self {
            contact_points: vec!["127.0.0.1:9042".to_string()],
            keyspace: "search_data".to_string(),
            replication_factor: 1,
            auto_create_schema: true,
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticsearchConfig {
    pub url: String,
    pub index_name: String,
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    pub request_timeout_ms: u64,
    /// Deepest `from + size` a search may request.
    pub max_result_window: u64,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index_name: "search_documents".to_string(),
            number_of_shards: 1,
            number_of_replicas: 0,
            request_timeout_ms: 30_000,
            max_result_window: 10_000,
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Run the periodic full sweep while serving.
    pub enabled: bool,
    pub interval_secs: u64,
    /// Sweep once immediately instead of waiting one interval.
    pub run_on_startup: bool,
    /// Documents indexed in parallel during a sweep.
    pub concurrency: usize,
    /// Index documents as they are created or updated through the API.
    pub index_on_write: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            run_on_startup: false,
            concurrency: 8,
            index_on_write: true,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            backend: BackendMode::default(),
            scylla: ScyllaConfig::default(),
            elasticsearch: ElasticsearchConfig::default(),
            sync: SyncConfig::default(),
            log_filter: "searchgate=info,tower_http=info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, file and environment.
    ///
    /// An explicit `path` must exist; otherwise `searchgate.toml` in the
    /// working directory is read if present.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config: AppConfig = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix("SEARCHGATE")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("scylla.contact_points")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port cannot be 0".to_string());
        }

        if self.backend == BackendMode::ScyllaElasticsearch {
            if self.scylla.contact_points.is_empty() {
                errors.push("scylla.contact_points cannot be empty".to_string());
            }
            if !is_cql_identifier(&self.scylla.keyspace) {
                errors.push(format!(
                    "scylla.keyspace '{}' is not a valid identifier",
                    self.scylla.keyspace
                ));
            }
            if self.scylla.replication_factor == 0 {
                errors.push("scylla.replication_factor cannot be 0".to_string());
            }
            if self.scylla.username.is_some() != self.scylla.password.is_some() {
                errors.push("scylla.username and scylla.password must be set together".to_string());
            }
            if self.elasticsearch.url.trim().is_empty() {
                errors.push("elasticsearch.url cannot be empty".to_string());
            }
            if self.elasticsearch.request_timeout_ms == 0 {
                errors.push("elasticsearch.request_timeout_ms cannot be 0".to_string());
            }
        }

        if self.elasticsearch.index_name.trim().is_empty()
            || self.elasticsearch.index_name != self.elasticsearch.index_name.to_lowercase()
        {
            errors.push("elasticsearch.index_name must be non-empty and lowercase".to_string());
        }
        if self.elasticsearch.max_result_window == 0 {
            errors.push("elasticsearch.max_result_window cannot be 0".to_string());
        }
        if self.sync.interval_secs == 0 {
            errors.push("sync.interval_secs cannot be 0".to_string());
        }
        if self.sync.concurrency == 0 {
            errors.push("sync.concurrency cannot be 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Config(errors.join("; ")))
        }
    }
}

/// Keyspace names are interpolated into CQL, so only plain identifiers pass.
fn is_cql_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && s.len() <= 48
}
