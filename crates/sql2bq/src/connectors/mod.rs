//! Source and destination connectors.
//!
//! The pipeline only talks to the two capability traits defined here:
//! [`SourceConnector`] (describe + streaming select) and
//! [`DestinationConnector`] (provisioning + bulk insert).

pub mod auth;
pub mod bigquery;
pub mod common;
pub mod dry_run;
#[cfg(feature = "mysql")]
pub mod mysql;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::batch::Batch;
use crate::config::{DestinationConfig, SourceConfig};
use crate::error::Result;
use crate::schema::{Schema, SourceColumn};

/// A source row as delivered by the wire: one text cell per column, `None` for NULL.
pub type RawRow = Vec<Option<String>>;

/// A decoded row, positionally aligned with the [`Schema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    values: Vec<serde_json::Value>,
}

impl Row {
    /// Creates a row from decoded cell values.
    #[must_use]
    pub fn new(values: Vec<serde_json::Value>) -> Self {
        Self { values }
    }

    /// Cell values in column order.
    #[must_use]
    pub fn values(&self) -> &[serde_json::Value] {
        &self.values
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Builds a `{field: value}` object by zipping the row with the schema.
    ///
    /// Returns `None` when the arity does not match.
    #[must_use]
    pub fn to_json_object(&self, schema: &Schema) -> Option<serde_json::Map<String, serde_json::Value>> {
        if self.values.len() != schema.len() {
            return None;
        }
        Some(
            schema
                .fields()
                .iter()
                .zip(&self.values)
                .map(|(field, value)| (field.name.clone(), value.clone()))
                .collect(),
        )
    }
}

/// A row rejected by the destination inside an otherwise accepted batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// Index of the row within its batch.
    pub row_index: usize,
    /// Destination-provided reason.
    pub message: String,
}

/// Fully qualified destination table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    /// Google Cloud project.
    pub project_id: String,
    /// BigQuery dataset.
    pub dataset_id: String,
    /// BigQuery table.
    pub table_id: String,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// Trait for source database connectors.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Get the source type name.
    fn source_type(&self) -> &'static str;

    /// Connect to the source and validate configuration.
    async fn connect(&mut self) -> Result<()>;

    /// Describe the table structure: columns in definition order.
    async fn describe(&self) -> Result<Vec<SourceColumn>>;

    /// Total number of rows, if cheaply known. Used for progress only.
    async fn row_count(&self) -> Result<Option<u64>>;

    /// Stream every row of the table in storage order without buffering
    /// the result set. Cells are aligned with [`SourceConnector::describe`].
    fn stream_select_all(&self) -> BoxStream<'_, Result<RawRow>>;

    /// Close the connection and cleanup resources.
    async fn close(&mut self) -> Result<()>;
}

/// Trait for warehouse destinations.
///
/// Implementations are shared by all load workers.
#[async_trait]
pub trait DestinationConnector: Send + Sync {
    /// Get the destination type name.
    fn destination_type(&self) -> &'static str;

    /// Create the dataset. Returns [`crate::Error::AlreadyExists`] if present.
    async fn ensure_dataset(&self, table: &TableRef) -> Result<()>;

    /// Delete the table. A missing table is not an error.
    async fn delete_table(&self, table: &TableRef) -> Result<()>;

    /// Create the table. Returns [`crate::Error::AlreadyExists`] if present.
    async fn create_table(&self, table: &TableRef, schema: &Schema) -> Result<()>;

    /// Append a batch of rows.
    ///
    /// `Ok` means the call was accepted; the returned list holds rows the
    /// destination rejected individually. A transient outage is reported as
    /// [`crate::Error::ServiceUnavailable`].
    async fn bulk_insert(
        &self,
        table: &TableRef,
        schema: &Schema,
        batch: &Batch,
    ) -> Result<Vec<RowError>>;
}

/// Create a source connector from configuration.
///
/// `row_limit` (0 = unlimited) lets the connector bound the query server side.
pub fn create_source(config: &SourceConfig, row_limit: u64) -> Result<Box<dyn SourceConnector>> {
    match config {
        #[cfg(feature = "mysql")]
        SourceConfig::MySql(cfg) => Ok(Box::new(mysql::MySqlConnector::new(
            cfg.clone(),
            row_limit,
        ))),
        #[cfg(not(feature = "mysql"))]
        SourceConfig::MySql(_) => {
            let _ = row_limit;
            Err(crate::error::Error::Config(
                "MySQL support requires the 'mysql' feature".to_string(),
            ))
        }
    }
}

/// Create the destination connector, or a no-op sink for dry runs.
pub fn create_destination(
    config: &DestinationConfig,
    dry_run: bool,
) -> Result<Arc<dyn DestinationConnector>> {
    if dry_run {
        return Ok(Arc::new(dry_run::DryRunDestination::default()));
    }
    Ok(Arc::new(bigquery::BigQueryConnector::new(config.clone())?))
}
