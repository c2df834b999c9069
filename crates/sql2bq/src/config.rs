//! Configuration types for sql2bq.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::connectors::TableRef;
use crate::error::{Error, Result};
use crate::retry::RetryConfig;

/// Default BigQuery REST endpoint.
pub const BIGQUERY_API_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Main migration configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Source database configuration.
    pub source: SourceConfig,
    /// Destination BigQuery configuration.
    pub destination: DestinationConfig,
    /// Migration options.
    #[serde(default)]
    pub options: MigrationOptions,
}

/// Source database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SourceConfig {
    /// MySQL / MariaDB table.
    #[serde(rename = "mysql")]
    MySql(MySqlConfig),
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::MySql(MySqlConfig::default())
    }
}

impl SourceConfig {
    /// Name of the table being copied.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::MySql(cfg) => &cfg.table,
        }
    }
}

/// MySQL connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MySqlConfig {
    /// Server hostname.
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// User name.
    #[serde(default = "default_user")]
    pub user: String,
    /// Password.
    #[serde(default)]
    pub password: String,
    /// Database (schema) name.
    #[serde(default)]
    pub database: String,
    /// Table to copy.
    #[serde(default)]
    pub table: String,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: String::new(),
            database: String::new(),
            table: String::new(),
        }
    }
}

/// Destination BigQuery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Google Cloud project id.
    #[serde(default)]
    pub project_id: String,
    /// Dataset name (created if missing).
    #[serde(default)]
    pub dataset: String,
    /// Table name. Defaults to the source table name.
    #[serde(default)]
    pub table: Option<String>,
    /// Service account key file. Tokens minted from it are refreshed
    /// for the whole run; takes precedence over `access_token`.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    /// OAuth2 access token used as-is (expires after about an hour).
    #[serde(default)]
    pub access_token: Option<String>,
    /// REST endpoint, overridable for emulators and tests.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            dataset: String::new(),
            table: None,
            key_file: None,
            access_token: None,
            api_url: default_api_url(),
        }
    }
}

/// Migration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Rows per insert batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum rows to copy (0 = whole table).
    #[serde(default)]
    pub limit: u64,
    /// Number of parallel load workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Total insert attempts per batch, first try included.
    #[serde(default = "default_max_attempts", alias = "max_retries")]
    pub max_attempts: u32,
    /// Backoff before the first retry, in milliseconds.
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    /// Backoff cap, in milliseconds.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Delete the destination table before creating it.
    #[serde(default)]
    pub delete_table: bool,
    /// Dry run mode (don't write to destination).
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            limit: 0,
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            delete_table: false,
            dry_run: false,
        }
    }
}

impl MigrationOptions {
    /// Retry policy for batch loads.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            ..RetryConfig::default()
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_user() -> String {
    "root".to_string()
}

fn default_api_url() -> String {
    BIGQUERY_API_URL.to_string()
}

fn default_batch_size() -> usize {
    1000
}

/// One worker per available core.
fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(4, usize::from)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_initial_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

impl MigrationConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Fully qualified destination table.
    #[must_use]
    pub fn table_ref(&self) -> TableRef {
        TableRef {
            project_id: self.destination.project_id.clone(),
            dataset_id: self.destination.dataset.clone(),
            table_id: self
                .destination
                .table
                .clone()
                .unwrap_or_else(|| self.source.table().to_string()),
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match &self.source {
            SourceConfig::MySql(cfg) => {
                if cfg.database.is_empty() {
                    return Err(Error::Config("source database is required".to_string()));
                }
                if cfg.table.is_empty() {
                    return Err(Error::Config("source table is required".to_string()));
                }
            }
        }

        if self.options.batch_size == 0 {
            return Err(Error::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.options.workers == 0 {
            return Err(Error::Config("workers must be greater than 0".to_string()));
        }
        if self.options.max_attempts == 0 {
            return Err(Error::Config(
                "max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.options.dry_run {
            return Ok(());
        }

        if self.destination.project_id.is_empty() {
            return Err(Error::Config("destination project_id is required".to_string()));
        }
        if self.destination.dataset.is_empty() {
            return Err(Error::Config("destination dataset is required".to_string()));
        }
        let has_token = self
            .destination
            .access_token
            .as_deref()
            .is_some_and(|token| !token.is_empty());
        if self.destination.key_file.is_none() && !has_token {
            return Err(Error::Config(
                "destination key_file or access_token is required (or use --dry-run)".to_string(),
            ));
        }
        crate::connectors::common::validate_url(&self.destination.api_url)
    }
}
