//! Destination that writes nothing.
//!
//! Used by `--dry-run` to exercise extraction, schema inference and batching
//! without touching BigQuery.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::batch::Batch;
use crate::connectors::{DestinationConnector, RowError, TableRef};
use crate::error::Result;
use crate::schema::Schema;

/// No-op destination that counts what it would have inserted.
#[derive(Debug, Default)]
pub struct DryRunDestination {
    rows: AtomicU64,
}

impl DryRunDestination {
    /// Rows accepted so far.
    #[must_use]
    pub fn rows_seen(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DestinationConnector for DryRunDestination {
    fn destination_type(&self) -> &'static str {
        "dry_run"
    }

    async fn ensure_dataset(&self, table: &TableRef) -> Result<()> {
        info!("[dry-run] would create dataset {}", table.dataset_id);
        Ok(())
    }

    async fn delete_table(&self, table: &TableRef) -> Result<()> {
        info!("[dry-run] would delete table {}", table);
        Ok(())
    }

    async fn create_table(&self, table: &TableRef, schema: &Schema) -> Result<()> {
        info!("[dry-run] would create table {} with {} fields", table, schema.len());
        Ok(())
    }

    async fn bulk_insert(
        &self,
        _table: &TableRef,
        _schema: &Schema,
        batch: &Batch,
    ) -> Result<Vec<RowError>> {
        self.rows.fetch_add(batch.len() as u64, Ordering::Relaxed);
        Ok(Vec::new())
    }
}
