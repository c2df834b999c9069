// Copy tool - pedantic lints relaxed for CLI ergonomics
#![allow(clippy::pedantic)]

//! # sql2bq
//!
//! `sql2bq` is a CLI tool and library that copies one MySQL table into a
//! BigQuery table in a single run.
//!
//! ## How a run works
//!
//! 1. The source table structure is described and mapped to a BigQuery schema
//!    ([`schema::SchemaBuilder`]).
//! 2. The row stream is opened; rows are read one at a time, never buffered
//!    as a whole ([`stream::stream_rows`]). DATETIME values become epoch
//!    seconds ([`temporal`]).
//! 3. The dataset and table are created if missing
//!    ([`provision::DestinationProvisioner`]).
//! 4. Rows are grouped into fixed-size batches ([`batch::BatchAssembler`]) and
//!    loaded by a pool of workers with bounded retry
//!    ([`dispatch::LoadDispatcher`]).
//!
//! The copy is best effort: failed batches and rejected rows are logged and
//! counted in [`MigrationStats`], they do not abort the run.
//!
//! ## Quick Start
//!
//! ```bash
//! sql2bq run -d shop -t orders -i my-project -n analytics -k google_key.json
//!
//! # Dry run (nothing written to BigQuery)
//! sql2bq run --config copy.yaml --dry-run
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! source:
//!   type: mysql
//!   host: 127.0.0.1
//!   port: 3306
//!   user: root
//!   database: shop
//!   table: orders
//!
//! destination:
//!   project_id: my-project
//!   dataset: analytics
//!
//! options:
//!   batch_size: 1000
//!   max_attempts: 5
//! ```

#![warn(missing_docs)]

pub mod batch;
pub mod config;
pub mod connectors;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod provision;
pub mod retry;
pub mod schema;
pub mod stream;
pub mod temporal;

#[cfg(test)]
mod test_support;

pub use config::{DestinationConfig, MigrationConfig, MigrationOptions, MySqlConfig, SourceConfig};
pub use connectors::{DestinationConnector, RawRow, Row, RowError, SourceConnector, TableRef};
pub use error::{Error, Result};
pub use pipeline::{MigrationStats, Pipeline};
pub use schema::{FieldMode, FieldType, Schema, SchemaBuilder, TypeMap};
