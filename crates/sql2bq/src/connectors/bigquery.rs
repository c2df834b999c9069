//! BigQuery destination over the v2 REST API.
//!
//! Datasets and tables are created with `datasets.insert` / `tables.insert`,
//! rows are appended with `tabledata.insertAll` (streaming inserts).

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::batch::Batch;
use crate::config::DestinationConfig;
use crate::connectors::auth::{token_source, TokenSource};
use crate::connectors::common::{create_http_client, handle_http_error, validate_url};
use crate::connectors::{DestinationConnector, RowError, TableRef};
use crate::error::{Error, Result};
use crate::schema::Schema;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference<'a> {
    project_id: &'a str,
    dataset_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetResource<'a> {
    dataset_reference: DatasetReference<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableReference<'a> {
    project_id: &'a str,
    dataset_id: &'a str,
    table_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableResource<'a> {
    table_reference: TableReference<'a>,
    schema: &'a Schema,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllRequest {
    skip_invalid_rows: bool,
    ignore_unknown_values: bool,
    rows: Vec<InsertRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertRow {
    insert_id: String,
    json: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertErrors>,
}

#[derive(Debug, Deserialize)]
struct InsertErrors {
    index: usize,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

/// BigQuery REST connector.
pub struct BigQueryConnector {
    config: DestinationConfig,
    client: Client,
    tokens: Option<Arc<dyn TokenSource>>,
    run_id: Uuid,
}

impl BigQueryConnector {
    /// Creates a connector authenticating with the configured key file or token.
    ///
    /// # Errors
    ///
    /// Returns an error if the API URL is invalid.
    pub fn new(config: DestinationConfig) -> Result<Self> {
        let tokens = token_source(&config);
        Self::build(config, tokens)
    }

    /// Creates a connector that asks `tokens` for a bearer token on every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the API URL is invalid.
    pub fn with_token_source(
        config: DestinationConfig,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self> {
        Self::build(config, Some(tokens))
    }

    fn build(config: DestinationConfig, tokens: Option<Arc<dyn TokenSource>>) -> Result<Self> {
        validate_url(&config.api_url)?;
        Ok(Self {
            config,
            client: create_http_client(),
            tokens,
            run_id: Uuid::new_v4(),
        })
    }

    fn base_url(&self) -> &str {
        self.config.api_url.trim_end_matches('/')
    }

    fn datasets_url(&self, table: &TableRef) -> String {
        format!("{}/projects/{}/datasets", self.base_url(), table.project_id)
    }

    fn tables_url(&self, table: &TableRef) -> String {
        format!(
            "{}/projects/{}/datasets/{}/tables",
            self.base_url(),
            table.project_id,
            table.dataset_id
        )
    }

    fn table_url(&self, table: &TableRef) -> String {
        format!("{}/{}", self.tables_url(table), table.table_id)
    }

    fn insert_all_url(&self, table: &TableRef) -> String {
        format!("{}/insertAll", self.table_url(table))
    }

    /// Makes an authenticated request with a freshly obtained token.
    async fn build_request(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let req = self.client.request(method, url);
        match &self.tokens {
            Some(tokens) => Ok(req.bearer_auth(tokens.access_token().await?)),
            None => Ok(req),
        }
    }

    async fn send(&self, req: RequestBuilder, context: &str) -> Result<Response> {
        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(handle_http_error(status.as_u16(), &body, context, retry_after))
    }

    /// Stable per-row id, identical across retries of the same batch.
    fn insert_id(&self, batch_index: u64, row_index: usize) -> String {
        format!("{}-{}-{}", self.run_id, batch_index, row_index)
    }

    /// Builds the insertAll body. Rows with the wrong arity are reported
    /// instead of sent; the returned indices map request rows back to the batch.
    fn build_insert_request(
        &self,
        schema: &Schema,
        batch: &Batch,
    ) -> (InsertAllRequest, Vec<usize>, Vec<RowError>) {
        let mut rows = Vec::with_capacity(batch.len());
        let mut sent = Vec::with_capacity(batch.len());
        let mut rejected = Vec::new();

        for (i, row) in batch.rows.iter().enumerate() {
            match row.to_json_object(schema) {
                Some(json) => {
                    rows.push(InsertRow {
                        insert_id: self.insert_id(batch.index, i),
                        json,
                    });
                    sent.push(i);
                }
                None => rejected.push(RowError {
                    row_index: i,
                    message: format!(
                        "row has {} values, schema has {} fields",
                        row.len(),
                        schema.len()
                    ),
                }),
            }
        }

        let request = InsertAllRequest {
            skip_invalid_rows: true,
            ignore_unknown_values: false,
            rows,
        };
        (request, sent, rejected)
    }
}

#[async_trait]
impl DestinationConnector for BigQueryConnector {
    fn destination_type(&self) -> &'static str {
        "bigquery"
    }

    async fn ensure_dataset(&self, table: &TableRef) -> Result<()> {
        let body = DatasetResource {
            dataset_reference: DatasetReference {
                project_id: &table.project_id,
                dataset_id: &table.dataset_id,
            },
        };
        let req = self
            .build_request(Method::POST, &self.datasets_url(table))
            .await?
            .json(&body);
        self.send(req, &format!("dataset {}", table.dataset_id))
            .await?;
        Ok(())
    }

    async fn delete_table(&self, table: &TableRef) -> Result<()> {
        let req = self
            .build_request(Method::DELETE, &self.table_url(table))
            .await?;
        match self.send(req, &format!("table {}", table)).await {
            Ok(_) => Ok(()),
            Err(Error::NotFound(_)) => {
                debug!("Table {} did not exist", table);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn create_table(&self, table: &TableRef, schema: &Schema) -> Result<()> {
        let body = TableResource {
            table_reference: TableReference {
                project_id: &table.project_id,
                dataset_id: &table.dataset_id,
                table_id: &table.table_id,
            },
            schema,
        };
        let req = self
            .build_request(Method::POST, &self.tables_url(table))
            .await?
            .json(&body);
        self.send(req, &format!("table {}", table)).await?;
        Ok(())
    }

    async fn bulk_insert(
        &self,
        table: &TableRef,
        schema: &Schema,
        batch: &Batch,
    ) -> Result<Vec<RowError>> {
        let (request, sent, mut row_errors) = self.build_insert_request(schema, batch);
        if request.rows.is_empty() {
            return Ok(row_errors);
        }

        let req = self
            .build_request(Method::POST, &self.insert_all_url(table))
            .await?
            .json(&request);
        let response = self
            .send(req, &format!("insertAll {}", table))
            .await
            .map_err(|e| match e {
                Error::Destination(msg) => Error::Loading(msg),
                other => other,
            })?;

        let parsed: InsertAllResponse = response
            .json()
            .await
            .map_err(|e| Error::Loading(format!("Failed to parse insertAll response: {}", e)))?;

        for insert_error in parsed.insert_errors {
            let row_index = sent
                .get(insert_error.index)
                .copied()
                .unwrap_or(insert_error.index);
            let message = insert_error
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.reason, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            row_errors.push(RowError { row_index, message });
        }
        row_errors.sort_by_key(|e| e.row_index);

        Ok(row_errors)
    }
}

#[cfg(test)]
#[path = "bigquery_tests.rs"]
mod tests;
