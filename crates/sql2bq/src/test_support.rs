//! In-memory collaborators for unit tests.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::batch::Batch;
use crate::connectors::{DestinationConnector, RawRow, RowError, SourceConnector, TableRef};
use crate::error::{Error, Result};
use crate::schema::{Schema, SourceColumn};

/// `(id int, name varchar, created datetime)` table producing `count` rows lazily.
pub struct MemorySource {
    pub columns: Vec<SourceColumn>,
    pub count: usize,
    /// Yield a read error in place of this row.
    pub fail_at: Option<usize>,
    pub pulled: Arc<AtomicUsize>,
}

impl MemorySource {
    pub fn new(count: usize) -> Self {
        Self {
            columns: vec![
                SourceColumn::new("id", "int(11)", false),
                SourceColumn::new("name", "varchar(32)", true),
                SourceColumn::new("created", "datetime", true),
            ],
            count,
            fail_at: None,
            pulled: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl SourceConnector for MemorySource {
    fn source_type(&self) -> &'static str {
        "memory"
    }

    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn describe(&self) -> Result<Vec<SourceColumn>> {
        Ok(self.columns.clone())
    }

    async fn row_count(&self) -> Result<Option<u64>> {
        Ok(Some(self.count as u64))
    }

    fn stream_select_all(&self) -> BoxStream<'_, Result<RawRow>> {
        let pulled = Arc::clone(&self.pulled);
        let fail_at = self.fail_at;
        stream::iter(0..self.count)
            .map(move |i| {
                pulled.fetch_add(1, Ordering::SeqCst);
                if fail_at == Some(i) {
                    return Err(Error::Extraction("Lost connection to MySQL server".to_string()));
                }
                Ok(vec![
                    Some(i.to_string()),
                    Some(format!("row-{i}")),
                    Some("1970-01-02 00:00:00".to_string()),
                ])
            })
            .boxed()
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Destination that records batches and fails on demand.
#[derive(Default)]
pub struct ScriptedDestination {
    /// Insert calls fail with 503 this many times before succeeding.
    pub transient_failures: AtomicU32,
    /// Insert calls fail with a non-transient error this many times.
    pub hard_failures: AtomicU32,
    /// Every insert call fails.
    pub always_fail: AtomicBool,
    /// Insert calls answer 429 with a 30s Retry-After this many times.
    pub rate_limited: AtomicU32,
    /// Every insert call is refused with an authentication error.
    pub reject_credentials: AtomicBool,
    /// The insert call for this batch panics.
    pub panic_on_batch: Option<u64>,
    /// Row indices rejected inside every accepted batch.
    pub reject_rows: Vec<usize>,
    pub insert_calls: AtomicU32,
    pub dataset_exists: AtomicBool,
    pub table: Mutex<Option<Schema>>,
    pub batches: Mutex<Vec<Batch>>,
}

#[async_trait]
impl DestinationConnector for ScriptedDestination {
    fn destination_type(&self) -> &'static str {
        "scripted"
    }

    async fn ensure_dataset(&self, table: &TableRef) -> Result<()> {
        if self.dataset_exists.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyExists(table.dataset_id.clone()));
        }
        Ok(())
    }

    async fn delete_table(&self, _table: &TableRef) -> Result<()> {
        self.table.lock().unwrap().take();
        Ok(())
    }

    async fn create_table(&self, table: &TableRef, schema: &Schema) -> Result<()> {
        let mut current = self.table.lock().unwrap();
        if current.is_some() {
            return Err(Error::AlreadyExists(table.to_string()));
        }
        *current = Some(schema.clone());
        Ok(())
    }

    async fn bulk_insert(
        &self,
        _table: &TableRef,
        _schema: &Schema,
        batch: &Batch,
    ) -> Result<Vec<RowError>> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);

        if self.panic_on_batch == Some(batch.index) {
            panic!("destination client crashed on batch {}", batch.index);
        }
        if self.reject_credentials.load(Ordering::SeqCst) {
            return Err(Error::Authentication("token expired".to_string()));
        }
        if take_one(&self.rate_limited) {
            return Err(Error::RateLimit(30));
        }
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(Error::ServiceUnavailable("always down".to_string()));
        }
        if take_one(&self.transient_failures) {
            return Err(Error::ServiceUnavailable("try later".to_string()));
        }
        if take_one(&self.hard_failures) {
            return Err(Error::Loading("connection closed".to_string()));
        }

        self.batches.lock().unwrap().push(batch.clone());
        Ok(self
            .reject_rows
            .iter()
            .filter(|&&i| i < batch.len())
            .map(|&i| RowError {
                row_index: i,
                message: "invalid: no such field".to_string(),
            })
            .collect())
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

pub fn table_ref() -> TableRef {
    TableRef {
        project_id: "acme".to_string(),
        dataset_id: "analytics".to_string(),
        table_id: "events".to_string(),
    }
}
