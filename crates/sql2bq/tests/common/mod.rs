//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use sql2bq::config::{DestinationConfig, MigrationConfig, MigrationOptions, MySqlConfig, SourceConfig};
use sql2bq::schema::SourceColumn;
use sql2bq::{RawRow, Result, SourceConnector};

/// Source table held in memory.
pub struct TableSource {
    pub columns: Vec<SourceColumn>,
    pub rows: Vec<RawRow>,
}

impl TableSource {
    /// `orders(id bigint unsigned NOT NULL, customer varchar(64), total decimal(10,2), created_at datetime)`
    pub fn orders(count: usize) -> Self {
        let rows = (0..count)
            .map(|i| {
                vec![
                    Some(i.to_string()),
                    if i % 10 == 0 { None } else { Some(format!("customer-{i}")) },
                    Some(format!("{}.{:02}", i, i % 100)),
                    Some("2021-03-04 05:06:07".to_string()),
                ]
            })
            .collect();
        Self {
            columns: vec![
                SourceColumn::new("id", "bigint(20) unsigned", false),
                SourceColumn::new("customer", "varchar(64)", true),
                SourceColumn::new("total", "decimal(10,2)", true),
                SourceColumn::new("created_at", "datetime", true),
            ],
            rows,
        }
    }
}

#[async_trait]
impl SourceConnector for TableSource {
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
        Ok(Some(self.rows.len() as u64))
    }

    fn stream_select_all(&self) -> BoxStream<'_, Result<RawRow>> {
        stream::iter(self.rows.iter().cloned().map(Ok)).boxed()
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Config pointing at `api_url` with fast retries.
pub fn config(api_url: &str, batch_size: usize, limit: u64) -> MigrationConfig {
    MigrationConfig {
        source: SourceConfig::MySql(MySqlConfig {
            database: "shop".to_string(),
            table: "orders".to_string(),
            ..MySqlConfig::default()
        }),
        destination: DestinationConfig {
            project_id: "acme".to_string(),
            dataset: "sales".to_string(),
            table: None,
            access_token: Some("test-token".to_string()),
            api_url: api_url.to_string(),
            ..DestinationConfig::default()
        },
        options: MigrationOptions {
            batch_size,
            limit,
            workers: 3,
            max_attempts: 5,
            retry_initial_delay_ms: 1,
            retry_max_delay_ms: 5,
            ..MigrationOptions::default()
        },
    }
}
