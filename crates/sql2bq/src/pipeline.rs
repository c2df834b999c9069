//! Copy pipeline orchestration.
//!
//! One run: introspect the source, open the row stream, provision the
//! destination, then stream rows through the batch assembler into the load
//! dispatcher. Extraction is strictly sequential; only loads run in parallel.

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::batch::BatchAssembler;
use crate::config::MigrationConfig;
use crate::connectors::{create_destination, create_source, DestinationConnector, SourceConnector};
use crate::dispatch::{LoadContext, LoadDispatcher, LoadTotals};
use crate::error::{Error, Result};
use crate::provision::DestinationProvisioner;
use crate::schema::{Schema, SchemaBuilder, TypeMap};
use crate::stream::stream_rows;

/// Migration statistics.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MigrationStats {
    /// Rows read from the source.
    pub extracted: u64,
    /// Rows accepted by the destination.
    pub loaded: u64,
    /// Rows rejected individually inside accepted batches.
    pub rejected_rows: u64,
    /// Batches dropped after exhausting their attempts.
    pub failed_batches: u64,
    /// Rows in dropped batches.
    pub failed_rows: u64,
    /// Batches dispatched.
    pub batches: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl MigrationStats {
    /// Calculate throughput (rows per second).
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.loaded as f64 / self.duration_secs
        } else {
            0.0
        }
    }

    /// Whether every extracted row made it to the destination.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed_batches == 0 && self.rejected_rows == 0 && self.loaded == self.extracted
    }

    fn absorb(&mut self, totals: &LoadTotals) {
        self.batches += totals.batches;
        self.loaded += totals.loaded_rows;
        self.rejected_rows += totals.rejected_rows;
        self.failed_batches += totals.failed_batches;
        self.failed_rows += totals.failed_rows;
    }
}

/// Copy pipeline for one table.
pub struct Pipeline {
    config: MigrationConfig,
    source: Box<dyn SourceConnector>,
    destination: Arc<dyn DestinationConnector>,
    type_map: TypeMap,
    show_progress: bool,
}

impl Pipeline {
    /// Create a pipeline with connectors built from the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a connector
    /// cannot be created.
    pub fn new(config: MigrationConfig) -> Result<Self> {
        config.validate()?;
        let source = create_source(&config.source, config.options.limit)?;
        let destination = create_destination(&config.destination, config.options.dry_run)?;
        Ok(Self::with_connectors(config, source, destination))
    }

    /// Create a pipeline over explicit connectors.
    #[must_use]
    pub fn with_connectors(
        config: MigrationConfig,
        source: Box<dyn SourceConnector>,
        destination: Arc<dyn DestinationConnector>,
    ) -> Self {
        Self {
            config,
            source,
            destination,
            type_map: TypeMap::mysql(),
            show_progress: true,
        }
    }

    /// Enable or disable the progress bar.
    #[must_use]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Connect to the source and infer the destination schema, touching nothing else.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be reached or introspected.
    pub async fn describe_schema(&mut self) -> Result<Schema> {
        self.source.connect().await?;
        let schema = SchemaBuilder::new(&self.type_map)
            .describe(self.source.as_ref())
            .await;
        if let Err(e) = self.source.close().await {
            warn!("Failed to close source: {}", e);
        }
        schema
    }

    /// Run the copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be introspected, the row stream
    /// cannot be opened or breaks mid-way, or the destination refuses the
    /// credentials. Other batch and row failures are counted in the returned
    /// stats instead.
    pub async fn run(&mut self) -> Result<MigrationStats> {
        let start = Instant::now();
        let mut stats = MigrationStats::default();

        info!(
            "Copying {} table {} into {} {}",
            self.source.source_type(),
            self.config.source.table(),
            self.destination.destination_type(),
            self.config.table_ref()
        );

        self.source.connect().await?;
        let result = self.copy(&mut stats).await;
        if let Err(e) = self.source.close().await {
            warn!("Failed to close source: {}", e);
        }
        result?;

        stats.duration_secs = start.elapsed().as_secs_f64();
        info!(
            "Copy complete: {} extracted, {} loaded, {} rejected, {} batches failed ({} rows) in {:.2}s ({:.0} rows/sec)",
            stats.extracted,
            stats.loaded,
            stats.rejected_rows,
            stats.failed_batches,
            stats.failed_rows,
            stats.duration_secs,
            stats.throughput()
        );

        Ok(stats)
    }

    #[allow(clippy::cognitive_complexity)] // Reason: sequential extract/provision/load steps of one run
    async fn copy(&self, stats: &mut MigrationStats) -> Result<()> {
        let options = &self.config.options;
        let table = self.config.table_ref();

        let schema = SchemaBuilder::new(&self.type_map)
            .describe(self.source.as_ref())
            .await?;
        info!("Destination schema has {} fields", schema.len());

        let total = match self.source.row_count().await {
            Ok(Some(count)) if options.limit > 0 => count.min(options.limit),
            Ok(Some(count)) => count,
            Ok(None) => 0,
            Err(e) => {
                warn!("Row count unavailable: {}", e);
                0
            }
        };

        // Fetch the first row before provisioning so an unreadable table
        // never leaves a half-created destination behind.
        let mut rows = stream_rows(self.source.as_ref(), &schema, options.limit);
        let mut pending = match rows.next().await {
            Some(Ok(row)) => Some(row),
            Some(Err(e)) => return Err(e),
            None => None,
        };

        DestinationProvisioner::new(self.destination.as_ref(), &table)
            .ensure(&schema, options.delete_table)
            .await;

        let dispatcher = LoadDispatcher::start(
            LoadContext {
                destination: Arc::clone(&self.destination),
                table,
                schema: schema.clone(),
                retry: options.retry_config(),
            },
            options.workers,
        );
        let progress = if self.show_progress {
            create_progress_bar(total)
        } else {
            ProgressBar::hidden()
        };

        let mut assembler = BatchAssembler::new(options.batch_size);
        let mut aborted = None;
        loop {
            let row = match pending.take() {
                Some(row) => row,
                None => match rows.next().await {
                    Some(Ok(row)) => row,
                    Some(Err(e)) => {
                        error!("Row stream failed after {} rows: {}", stats.extracted, e);
                        aborted = Some(e);
                        break;
                    }
                    None => break,
                },
            };

            stats.extracted += 1;
            progress.inc(1);

            if let Some(batch) = assembler.push(row) {
                if let Err(e) = dispatcher.dispatch(batch).await {
                    aborted = Some(e);
                    break;
                }
            }
        }
        drop(rows);

        if let Some(tail) = assembler.finish() {
            if let Err(e) = dispatcher.dispatch(tail).await {
                aborted.get_or_insert(e);
            }
        }

        let totals = dispatcher.finish().await;
        stats.absorb(&totals);
        progress.finish_with_message("Copy complete");

        if let Some(reason) = totals.halted {
            error!("Loading halted after {} batches: {}", stats.batches, reason);
            aborted.get_or_insert(Error::Authentication(reason));
        }

        match aborted {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = if total > 0 {
        ProgressBar::new(total)
    } else {
        ProgressBar::new_spinner()
    };

    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    pb
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
