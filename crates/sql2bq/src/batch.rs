//! Fixed-size batch assembly.

use crate::connectors::Row;

/// An ordered group of rows loaded with a single insert call.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Position of the batch in emission order, starting at 0.
    pub index: u64,
    /// Rows in source order.
    pub rows: Vec<Row>,
}

impl Batch {
    /// Creates a batch.
    #[must_use]
    pub fn new(index: u64, rows: Vec<Row>) -> Self {
        Self { index, rows }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Groups a row stream into batches of at most `batch_size` rows.
///
/// Call [`BatchAssembler::finish`] once the stream ends to get the short tail.
#[derive(Debug)]
pub struct BatchAssembler {
    batch_size: usize,
    next_index: u64,
    current: Vec<Row>,
}

impl BatchAssembler {
    /// Creates an assembler. A zero batch size is treated as 1.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            next_index: 0,
            current: Vec::with_capacity(batch_size),
        }
    }

    /// Adds a row, returning a full batch when one completes.
    pub fn push(&mut self, row: Row) -> Option<Batch> {
        self.current.push(row);
        if self.current.len() >= self.batch_size {
            let rows = std::mem::replace(&mut self.current, Vec::with_capacity(self.batch_size));
            Some(self.emit(rows))
        } else {
            None
        }
    }

    /// Flushes the remaining rows as a final, possibly short, batch.
    pub fn finish(mut self) -> Option<Batch> {
        if self.current.is_empty() {
            return None;
        }
        let rows = std::mem::take(&mut self.current);
        Some(self.emit(rows))
    }

    /// Rows waiting for the current batch to fill.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.current.len()
    }

    /// Batches emitted so far.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.next_index
    }

    fn emit(&mut self, rows: Vec<Row>) -> Batch {
        let batch = Batch::new(self.next_index, rows);
        self.next_index += 1;
        batch
    }
}
