//! Tests for the copy pipeline.

use super::*;
use crate::config::{DestinationConfig, MigrationOptions, MySqlConfig, SourceConfig};
use crate::connectors::dry_run::DryRunDestination;
use crate::error::Error;
use crate::test_support::{MemorySource, ScriptedDestination};
use serde_json::json;
use std::sync::atomic::Ordering;

fn config(batch_size: usize, limit: u64) -> MigrationConfig {
    MigrationConfig {
        source: SourceConfig::MySql(MySqlConfig {
            database: "app".to_string(),
            table: "events".to_string(),
            ..MySqlConfig::default()
        }),
        destination: DestinationConfig {
            project_id: "acme".to_string(),
            dataset: "analytics".to_string(),
            ..DestinationConfig::default()
        },
        options: MigrationOptions {
            batch_size,
            limit,
            workers: 4,
            max_attempts: 5,
            retry_initial_delay_ms: 0,
            retry_max_delay_ms: 0,
            ..MigrationOptions::default()
        },
    }
}

fn pipeline(
    config: MigrationConfig,
    source: MemorySource,
    destination: &Arc<ScriptedDestination>,
) -> Pipeline {
    Pipeline::with_connectors(config, Box::new(source), Arc::clone(destination) as Arc<dyn DestinationConnector>)
        .with_progress(false)
}

fn stored_batch_sizes(destination: &ScriptedDestination) -> Vec<usize> {
    let mut batches = destination.batches.lock().unwrap().clone();
    batches.sort_by_key(|b| b.index);
    batches.iter().map(|b| b.len()).collect()
}

// ==================== MigrationStats Tests ====================

#[test]
fn test_migration_stats_throughput() {
    let stats = MigrationStats {
        extracted: 1000,
        loaded: 1000,
        batches: 10,
        duration_secs: 2.0,
        ..MigrationStats::default()
    };

    assert!((stats.throughput() - 500.0).abs() < 0.001);
    assert!(stats.is_complete());
}

#[test]
fn test_migration_stats_zero_duration() {
    let stats = MigrationStats::default();
    assert_eq!(stats.throughput(), 0.0);
}

#[test]
fn test_migration_stats_absorb() {
    let mut stats = MigrationStats {
        extracted: 14,
        ..MigrationStats::default()
    };
    stats.absorb(&LoadTotals {
        batches: 2,
        loaded_rows: 9,
        rejected_rows: 1,
        failed_batches: 1,
        failed_rows: 4,
        halted: None,
    });

    assert_eq!(stats.batches, 2);
    assert_eq!(stats.loaded, 9);
    assert_eq!(stats.rejected_rows, 1);
    assert_eq!(stats.failed_batches, 1);
    assert_eq!(stats.failed_rows, 4);
    assert!(!stats.is_complete());
}

// ==================== Pipeline Tests ====================

#[tokio::test]
async fn test_run_copies_full_table_in_batches() {
    // Arrange
    let dest = Arc::new(ScriptedDestination::default());
    let mut pipeline = pipeline(config(1000, 0), MemorySource::new(2500), &dest);

    // Act
    let stats = pipeline.run().await.unwrap();

    // Assert
    assert_eq!(stats.extracted, 2500);
    assert_eq!(stats.loaded, 2500);
    assert_eq!(stats.batches, 3);
    assert!(stats.is_complete());
    assert_eq!(stored_batch_sizes(&dest), [1000, 1000, 500]);
    assert!(dest.dataset_exists.load(Ordering::SeqCst));
    assert_eq!(dest.table.lock().unwrap().as_ref().map(Schema::len), Some(3));
}

#[tokio::test]
async fn test_run_preserves_row_order_within_batches() {
    let dest = Arc::new(ScriptedDestination::default());
    let mut pipeline = pipeline(config(7, 0), MemorySource::new(30), &dest);

    pipeline.run().await.unwrap();

    let mut batches = dest.batches.lock().unwrap().clone();
    batches.sort_by_key(|b| b.index);
    let ids: Vec<_> = batches
        .iter()
        .flat_map(|b| b.rows.iter().map(|r| r.values()[0].clone()))
        .collect();
    assert_eq!(ids, (0..30).map(|i| json!(i)).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_run_respects_limit() {
    let dest = Arc::new(ScriptedDestination::default());
    let mut pipeline = pipeline(config(1000, 10), MemorySource::new(2500), &dest);

    let stats = pipeline.run().await.unwrap();

    assert_eq!(stats.extracted, 10);
    assert_eq!(stats.loaded, 10);
    assert_eq!(stored_batch_sizes(&dest), [10]);
}

#[tokio::test]
async fn test_run_empty_table() {
    let dest = Arc::new(ScriptedDestination::default());
    let mut pipeline = pipeline(config(1000, 0), MemorySource::new(0), &dest);

    let stats = pipeline.run().await.unwrap();

    assert_eq!(stats, MigrationStats { duration_secs: stats.duration_secs, ..MigrationStats::default() });
    assert!(dest.table.lock().unwrap().is_some());
    assert_eq!(dest.insert_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_run_into_existing_table_appends() {
    let dest = Arc::new(ScriptedDestination::default());
    pipeline(config(100, 0), MemorySource::new(50), &dest)
        .run()
        .await
        .unwrap();

    let stats = pipeline(config(100, 0), MemorySource::new(50), &dest)
        .run()
        .await
        .unwrap();

    assert_eq!(stats.loaded, 50);
    assert_eq!(dest.batches.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_run_retries_transient_failures() {
    let dest = Arc::new(ScriptedDestination::default());
    dest.transient_failures.store(3, Ordering::SeqCst);
    let mut pipeline = pipeline(config(10, 0), MemorySource::new(40), &dest);

    let stats = pipeline.run().await.unwrap();

    assert_eq!(stats.loaded, 40);
    assert_eq!(stats.failed_batches, 0);
    assert_eq!(dest.insert_calls.load(Ordering::SeqCst), 4 + 3);
}

#[tokio::test]
async fn test_run_failed_batches_do_not_abort() {
    let dest = Arc::new(ScriptedDestination::default());
    dest.always_fail.store(true, Ordering::SeqCst);
    let mut cfg = config(10, 0);
    cfg.options.max_attempts = 2;
    let mut pipeline = pipeline(cfg, MemorySource::new(25), &dest);

    let stats = pipeline.run().await.unwrap();

    assert_eq!(stats.extracted, 25);
    assert_eq!(stats.loaded, 0);
    assert_eq!(stats.failed_batches, 3);
    assert_eq!(stats.failed_rows, 25);
    assert!(!stats.is_complete());
    assert_eq!(dest.insert_calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_run_counts_rejected_rows() {
    let dest = Arc::new(ScriptedDestination {
        reject_rows: vec![0],
        ..ScriptedDestination::default()
    });
    let mut pipeline = pipeline(config(10, 0), MemorySource::new(20), &dest);

    let stats = pipeline.run().await.unwrap();

    assert_eq!(stats.rejected_rows, 2);
    assert_eq!(stats.loaded, 18);
    assert_eq!(stats.failed_batches, 0);
}

#[tokio::test]
async fn test_run_describe_failure_aborts_before_provisioning() {
    let dest = Arc::new(ScriptedDestination::default());
    let mut source = MemorySource::new(10);
    source.columns.clear();
    let mut pipeline = pipeline(config(10, 0), source, &dest);

    let result = pipeline.run().await;

    assert!(matches!(result, Err(Error::Extraction(_))));
    assert!(!dest.dataset_exists.load(Ordering::SeqCst));
    assert!(dest.table.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_run_stream_open_failure_aborts_before_provisioning() {
    let dest = Arc::new(ScriptedDestination::default());
    let mut source = MemorySource::new(10);
    source.fail_at = Some(0);
    let mut pipeline = pipeline(config(10, 0), source, &dest);

    let result = pipeline.run().await;

    assert!(matches!(result, Err(Error::Extraction(_))));
    assert!(!dest.dataset_exists.load(Ordering::SeqCst));
    assert!(dest.table.lock().unwrap().is_none());
    assert_eq!(dest.insert_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_run_mid_stream_failure_flushes_read_rows() {
    let dest = Arc::new(ScriptedDestination::default());
    let mut source = MemorySource::new(100);
    source.fail_at = Some(25);
    let mut pipeline = pipeline(config(10, 0), source, &dest);

    let result = pipeline.run().await;

    assert!(matches!(result, Err(Error::Extraction(_))));
    assert_eq!(stored_batch_sizes(&dest), [10, 10, 5]);
}

#[tokio::test]
async fn test_run_reset_recreates_table() {
    let dest = Arc::new(ScriptedDestination::default());
    *dest.table.lock().unwrap() = Some(Schema::default());
    let mut cfg = config(10, 0);
    cfg.options.delete_table = true;
    let mut pipeline = pipeline(cfg, MemorySource::new(5), &dest);

    pipeline.run().await.unwrap();

    assert_eq!(dest.table.lock().unwrap().as_ref().map(Schema::len), Some(3));
}

#[tokio::test]
async fn test_run_dry_run_destination() {
    let dest = Arc::new(DryRunDestination::default());
    let mut pipeline = Pipeline::with_connectors(
        config(10, 0),
        Box::new(MemorySource::new(35)),
        Arc::clone(&dest) as Arc<dyn DestinationConnector>,
    )
    .with_progress(false);

    let stats = pipeline.run().await.unwrap();

    assert_eq!(stats.loaded, 35);
    assert_eq!(stats.batches, 4);
    assert_eq!(dest.rows_seen(), 35);
}

#[tokio::test]
async fn test_describe_schema() {
    let dest = Arc::new(ScriptedDestination::default());
    let mut pipeline = pipeline(config(10, 0), MemorySource::new(5), &dest);

    let schema = pipeline.describe_schema().await.unwrap();

    let names: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["id", "name", "created"]);
    assert!(dest.table.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_run_fails_when_credentials_are_refused() {
    let dest = Arc::new(ScriptedDestination::default());
    dest.reject_credentials.store(true, Ordering::SeqCst);
    let mut cfg = config(10, 0);
    cfg.options.workers = 1;
    let mut pipeline = pipeline(cfg, MemorySource::new(500), &dest);

    let err = pipeline.run().await.unwrap_err();

    assert!(matches!(err, Error::Authentication(_)));
    assert_eq!(dest.insert_calls.load(Ordering::SeqCst), 1);
    assert!(dest.batches.lock().unwrap().is_empty());
}
