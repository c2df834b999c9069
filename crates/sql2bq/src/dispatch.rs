//! Parallel batch loading with bounded retry.
//!
//! [`LoadDispatcher`] owns a bounded queue drained by a fixed set of worker
//! tasks. Each worker drives one batch at a time through the [`LoadState`]
//! machine: attempts are classified into an [`AttemptResult`] and retried
//! until they succeed or the attempt ceiling is reached. A failed batch is
//! logged and dropped; it never aborts the run. Rejected credentials are the
//! exception: they halt every worker, since no later batch could load either.
//!
//! Workers keep running [`LoadTotals`] instead of per-batch outcomes, so
//! memory stays flat however many batches or rejected rows a run produces.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::batch::Batch;
use crate::connectors::{DestinationConnector, RowError, TableRef};
use crate::error::{Error, Result};
use crate::retry::RetryConfig;
use crate::schema::Schema;

/// Result of loading one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Index of the batch.
    pub batch_index: u64,
    /// Rows in the batch.
    pub rows: usize,
    /// Insert attempts made.
    pub attempts: u32,
    /// Whether an insert call was accepted.
    pub succeeded: bool,
    /// Rows rejected individually by the destination.
    pub row_errors: Vec<RowError>,
    /// Last failure message when the batch was dropped.
    pub error: Option<String>,
    /// The destination refused the credentials.
    pub credentials_rejected: bool,
}

impl LoadOutcome {
    /// Rows that made it into the destination.
    #[must_use]
    pub fn loaded_rows(&self) -> usize {
        if self.succeeded {
            self.rows.saturating_sub(self.row_errors.len())
        } else {
            0
        }
    }
}

/// Classified result of a single insert attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    /// The call went through; some rows may have been rejected.
    Accepted {
        /// Rejected rows.
        row_errors: Vec<RowError>,
    },
    /// The destination signalled a temporary outage.
    Unavailable(String),
    /// Any other failure of the call.
    Failed(String),
    /// The destination refused the credentials; retrying cannot help.
    Rejected(String),
}

impl From<Result<Vec<RowError>>> for AttemptResult {
    fn from(result: Result<Vec<RowError>>) -> Self {
        match result {
            Ok(row_errors) => Self::Accepted { row_errors },
            Err(Error::Authentication(msg)) => Self::Rejected(msg),
            Err(e) if e.is_transient() => Self::Unavailable(e.to_string()),
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

/// Per-batch load state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// Queued, not yet attempted.
    Pending,
    /// About to make attempt number `attempt` (1-based).
    Attempting {
        /// Attempt number.
        attempt: u32,
    },
    /// An attempt was accepted.
    Succeeded {
        /// Attempts made.
        attempts: u32,
        /// Rows rejected inside the accepted call.
        row_errors: Vec<RowError>,
    },
    /// The attempt ceiling was reached.
    Failed {
        /// Attempts made.
        attempts: u32,
        /// Last failure.
        error: String,
    },
}

impl LoadState {
    /// Transition taken when a worker picks the batch up.
    #[must_use]
    pub fn start(self) -> Self {
        match self {
            Self::Pending => Self::Attempting { attempt: 1 },
            other => other,
        }
    }

    /// Transition taken after an attempt resolves.
    #[must_use]
    pub fn on_result(self, result: AttemptResult, max_attempts: u32) -> Self {
        let Self::Attempting { attempt } = self else {
            return self;
        };
        match result {
            AttemptResult::Accepted { row_errors } => Self::Succeeded {
                attempts: attempt,
                row_errors,
            },
            AttemptResult::Rejected(error) => Self::Failed {
                attempts: attempt,
                error,
            },
            AttemptResult::Unavailable(error) | AttemptResult::Failed(error)
                if attempt >= max_attempts =>
            {
                Self::Failed {
                    attempts: attempt,
                    error,
                }
            }
            AttemptResult::Unavailable(_) | AttemptResult::Failed(_) => Self::Attempting {
                attempt: attempt + 1,
            },
        }
    }

    /// Whether no further attempts will be made.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

/// Everything a worker needs to load a batch.
pub struct LoadContext {
    /// Shared destination client.
    pub destination: Arc<dyn DestinationConnector>,
    /// Target table.
    pub table: TableRef,
    /// Destination schema.
    pub schema: Schema,
    /// Retry policy.
    pub retry: RetryConfig,
}

/// Loads one batch, retrying until accepted or out of attempts.
pub async fn load_batch(ctx: &LoadContext, batch: &Batch) -> LoadOutcome {
    let max_attempts = ctx.retry.max_attempts.max(1);
    let mut state = LoadState::Pending.start();
    let mut retry_after = None;
    let mut credentials_rejected = false;

    while let LoadState::Attempting { attempt } = state {
        if attempt > 1 {
            sleep(ctx.retry.delay_after(attempt - 1, retry_after.take())).await;
        }

        info!("Sending batch {} ({} rows)", batch.index, batch.len());
        let response = ctx
            .destination
            .bulk_insert(&ctx.table, &ctx.schema, batch)
            .await;
        retry_after = response.as_ref().err().and_then(Error::retry_after);
        let result = AttemptResult::from(response);

        match &result {
            AttemptResult::Accepted { .. } => {}
            AttemptResult::Rejected(msg) => {
                credentials_rejected = true;
                error!(
                    "Batch {} credentials rejected by the destination: {}",
                    batch.index, msg
                );
            }
            AttemptResult::Unavailable(msg) => error!(
                "Batch {} insert failed with service unavailable, attempt {}/{}: {}",
                batch.index, attempt, max_attempts, msg
            ),
            AttemptResult::Failed(msg) => error!(
                "Batch {} not able to upload data, attempt {}/{}: {}",
                batch.index, attempt, max_attempts, msg
            ),
        }

        state = state.on_result(result, max_attempts);
    }

    match state {
        LoadState::Succeeded {
            attempts,
            row_errors,
        } => {
            for row_error in &row_errors {
                error!(
                    "Batch {} row {} rejected: {}",
                    batch.index, row_error.row_index, row_error.message
                );
            }
            info!("Batch {} uploaded after {} attempt(s)", batch.index, attempts);
            LoadOutcome {
                batch_index: batch.index,
                rows: batch.len(),
                attempts,
                succeeded: true,
                row_errors,
                error: None,
                credentials_rejected: false,
            }
        }
        state => {
            let (attempts, error) = match state {
                LoadState::Failed { attempts, error } => (attempts, error),
                other => (0, format!("load stopped in state {:?}", other)),
            };
            error!(
                "Batch {} dropped after {} attempts: {}",
                batch.index, attempts, error
            );
            LoadOutcome {
                batch_index: batch.index,
                rows: batch.len(),
                attempts,
                succeeded: false,
                row_errors: Vec::new(),
                error: Some(error),
                credentials_rejected,
            }
        }
    }
}

/// Running counts over every batch a worker resolved.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadTotals {
    /// Batches resolved, loaded or dropped.
    pub batches: u64,
    /// Rows accepted by the destination.
    pub loaded_rows: u64,
    /// Rows rejected individually inside accepted batches.
    pub rejected_rows: u64,
    /// Batches dropped.
    pub failed_batches: u64,
    /// Rows in dropped batches.
    pub failed_rows: u64,
    /// Set when loading stopped early because credentials were refused.
    pub halted: Option<String>,
}

impl LoadTotals {
    /// Folds one batch outcome into the counts.
    pub fn record(&mut self, outcome: &LoadOutcome) {
        if outcome.succeeded {
            self.batches += 1;
            self.loaded_rows += outcome.loaded_rows() as u64;
            self.rejected_rows += outcome.row_errors.len() as u64;
        } else {
            self.record_failed(outcome.rows);
        }
    }

    /// Counts a batch that never reached the destination.
    pub fn record_failed(&mut self, rows: usize) {
        self.batches += 1;
        self.failed_batches += 1;
        self.failed_rows += rows as u64;
    }

    fn merge(&mut self, other: &Self) {
        self.batches += other.batches;
        self.loaded_rows += other.loaded_rows;
        self.rejected_rows += other.rejected_rows;
        self.failed_batches += other.failed_batches;
        self.failed_rows += other.failed_rows;
    }
}

/// What one worker has done so far, readable even if the worker dies.
#[derive(Debug, Default)]
struct WorkerLedger {
    totals: LoadTotals,
    /// Rows of the batch being loaded right now.
    in_flight: Option<usize>,
}

/// Locks a mutex that is only held for plain field updates.
fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bounded queue plus a fixed pool of load workers.
pub struct LoadDispatcher {
    sender: mpsc::Sender<Batch>,
    workers: Vec<(JoinHandle<()>, Arc<StdMutex<WorkerLedger>>)>,
    halt: Arc<StdMutex<Option<String>>>,
}

impl LoadDispatcher {
    /// Spawns `workers` load tasks. The queue holds at most `2 * workers` batches.
    #[must_use]
    pub fn start(ctx: LoadContext, workers: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel::<Batch>(workers * 2);
        let receiver = Arc::new(Mutex::new(receiver));
        let ctx = Arc::new(ctx);
        let halt = Arc::new(StdMutex::new(None));

        let handles = (0..workers)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let ctx = Arc::clone(&ctx);
                let halt = Arc::clone(&halt);
                let ledger = Arc::new(StdMutex::new(WorkerLedger::default()));
                let worker_ledger = Arc::clone(&ledger);
                let handle = tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(batch) = next else { break };

                        let halted = lock(&halt).clone();
                        if let Some(reason) = halted {
                            debug!("Worker {} skipping batch {}: {}", worker_id, batch.index, reason);
                            lock(&worker_ledger).totals.record_failed(batch.len());
                            continue;
                        }

                        debug!("Worker {} picked up batch {}", worker_id, batch.index);
                        lock(&worker_ledger).in_flight = Some(batch.len());
                        let outcome = load_batch(&ctx, &batch).await;

                        if outcome.credentials_rejected {
                            let mut first = lock(&halt);
                            if first.is_none() {
                                *first = outcome.error.clone();
                            }
                        }
                        let mut ledger = lock(&worker_ledger);
                        ledger.in_flight = None;
                        ledger.totals.record(&outcome);
                    }
                });
                (handle, ledger)
            })
            .collect();

        debug!("Started {} load workers", workers);
        Self {
            sender,
            workers: handles,
            halt,
        }
    }

    /// Queues a batch, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns an error if loading was halted by refused credentials or
    /// every worker has exited.
    pub async fn dispatch(&self, batch: Batch) -> Result<()> {
        let halted = lock(&self.halt).clone();
        if let Some(reason) = halted {
            return Err(Error::Authentication(reason));
        }
        let index = batch.index;
        self.sender
            .send(batch)
            .await
            .map_err(|_| Error::Loading(format!("no load worker left for batch {}", index)))
    }

    /// Closes the queue, waits for every queued batch to resolve and returns
    /// the combined counts.
    ///
    /// A batch held by a worker that died is counted as failed.
    pub async fn finish(self) -> LoadTotals {
        drop(self.sender);

        let mut totals = LoadTotals::default();
        for (handle, ledger) in self.workers {
            let crashed = handle.await.err();
            let mut ledger = lock(&ledger);
            if let Some(e) = crashed {
                warn!("Load worker terminated abnormally: {}", e);
                if let Some(rows) = ledger.in_flight.take() {
                    ledger.totals.record_failed(rows);
                }
            }
            totals.merge(&ledger.totals);
        }
        totals.halted = lock(&self.halt).take();
        totals
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
