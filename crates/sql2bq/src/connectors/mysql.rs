//! MySQL / MariaDB source connector.
//!
//! The row stream uses the text protocol (an unprepared `SELECT`), so every
//! cell arrives as text and the server delivers rows as they are read.
//! DATETIME values therefore reach the pipeline as `YYYY-MM-DD HH:MM:SS`
//! strings and are normalized downstream.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Executor, Row as _};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::MySqlConfig;
use crate::connectors::common::quote_identifier;
use crate::connectors::{RawRow, SourceConnector};
use crate::error::{Error, Result};
use crate::schema::SourceColumn;

const DESCRIBE_SQL: &str = "SELECT CAST(COLUMN_NAME AS CHAR), CAST(COLUMN_TYPE AS CHAR), \
     CAST(IS_NULLABLE AS CHAR) \
     FROM information_schema.COLUMNS \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
     ORDER BY ORDINAL_POSITION";

/// MySQL source connector.
pub struct MySqlConnector {
    config: MySqlConfig,
    select_sql: String,
    pool: Option<MySqlPool>,
}

impl MySqlConnector {
    /// Creates a connector. `row_limit` of 0 selects the whole table.
    #[must_use]
    pub fn new(config: MySqlConfig, row_limit: u64) -> Self {
        let select_sql = build_select(&config.database, &config.table, row_limit);
        Self {
            config,
            select_sql,
            pool: None,
        }
    }

    fn pool(&self) -> Result<&MySqlPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| Error::SourceConnection("MySQL connector is not connected".to_string()))
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.user)
            .password(&self.config.password)
            .database(&self.config.database)
            .charset("utf8mb4")
    }
}

/// `SELECT *` over the fully qualified table, with an optional `LIMIT`.
fn build_select(database: &str, table: &str, row_limit: u64) -> String {
    let mut sql = format!(
        "SELECT * FROM {}.{}",
        quote_identifier(database),
        quote_identifier(table)
    );
    if row_limit > 0 {
        sql.push_str(&format!(" LIMIT {}", row_limit));
    }
    sql
}

/// Reads one cell as text, falling back to lossy UTF-8 for binary columns.
fn cell_text(row: &MySqlRow, index: usize) -> Option<String> {
    if let Ok(value) = row.try_get_unchecked::<Option<String>, _>(index) {
        return value;
    }
    row.try_get_unchecked::<Option<Vec<u8>>, _>(index)
        .ok()
        .flatten()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

fn raw_row(row: &MySqlRow) -> RawRow {
    (0..row.len()).map(|i| cell_text(row, i)).collect()
}

#[async_trait]
impl SourceConnector for MySqlConnector {
    fn source_type(&self) -> &'static str {
        "mysql"
    }

    async fn connect(&mut self) -> Result<()> {
        info!(
            "Connecting to MySQL {}:{}/{}",
            self.config.host, self.config.port, self.config.database
        );
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(self.connect_options())
            .await
            .map_err(|e| {
                Error::SourceConnection(format!(
                    "{}@{}:{}: {}",
                    self.config.user, self.config.host, self.config.port, e
                ))
            })?;
        self.pool = Some(pool);
        Ok(())
    }

    async fn describe(&self) -> Result<Vec<SourceColumn>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(DESCRIBE_SQL)
            .bind(&self.config.database)
            .bind(&self.config.table)
            .fetch_all(self.pool()?)
            .await
            .map_err(|e| {
                Error::Extraction(format!(
                    "cannot describe table {}: {}",
                    self.config.table, e
                ))
            })?;

        debug!("Table {} has {} columns", self.config.table, rows.len());
        Ok(rows
            .into_iter()
            .map(|(name, column_type, nullable)| {
                SourceColumn::new(name, column_type, nullable.eq_ignore_ascii_case("YES"))
            })
            .collect())
    }

    async fn row_count(&self) -> Result<Option<u64>> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}.{}",
            quote_identifier(&self.config.database),
            quote_identifier(&self.config.table)
        );
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(self.pool()?).await?;
        Ok(u64::try_from(count).ok())
    }

    fn stream_select_all(&self) -> BoxStream<'_, Result<RawRow>> {
        let pool = match self.pool() {
            Ok(pool) => pool,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };
        debug!("Streaming: {}", self.select_sql);
        pool.fetch(self.select_sql.as_str())
            .map(|row| {
                row.map(|row| raw_row(&row))
                    .map_err(|e| Error::Extraction(e.to_string()))
            })
            .boxed()
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MySqlConfig {
        MySqlConfig {
            database: "shop".to_string(),
            table: "orders".to_string(),
            ..MySqlConfig::default()
        }
    }

    #[test]
    fn test_build_select_whole_table() {
        assert_eq!(build_select("shop", "orders", 0), "SELECT * FROM `shop`.`orders`");
    }

    #[test]
    fn test_build_select_with_limit() {
        assert_eq!(
            build_select("shop", "orders", 10),
            "SELECT * FROM `shop`.`orders` LIMIT 10"
        );
    }

    #[test]
    fn test_build_select_quotes_identifiers() {
        assert_eq!(
            build_select("my db", "or`ders", 0),
            "SELECT * FROM `my db`.`or``ders`"
        );
    }

    #[test]
    fn test_mysql_connector_new() {
        let connector = MySqlConnector::new(config(), 0);
        assert_eq!(connector.source_type(), "mysql");
        assert!(connector.pool.is_none());
    }

    #[tokio::test]
    async fn test_stream_before_connect_fails() {
        let connector = MySqlConnector::new(config(), 0);
        let first = connector.stream_select_all().next().await;
        assert!(matches!(first, Some(Err(Error::SourceConnection(_)))));
    }

    #[tokio::test]
    async fn test_describe_before_connect_fails() {
        let connector = MySqlConnector::new(config(), 0);
        assert!(connector.describe().await.is_err());
    }
}
