//! Trino statement execution over the HTTP protocol. A statement is POSTed
//! to /v1/statement and its result pages polled via nextUri until the server
//! stops handing one back or reports an error.

use crate::config::TrinoConfig;
use crate::error::LoadError;
use crate::loader::{sql, TableBatch, TableSink};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct TrinoSink {
    client: reqwest::Client,
    statement_url: String,
    user: String,
    catalog: String,
    schema: String,
}

impl TrinoSink {
    pub fn new(config: &TrinoConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()?,
            statement_url: format!("http://{}:{}/v1/statement", config.host, config.port),
            user: config.user.clone(),
            catalog: config.catalog.clone(),
            schema: config.schema.clone(),
        })
    }

    #[instrument(skip(self, statement))]
    async fn execute(&self, statement: &str) -> Result<(), LoadError> {
        debug!(bytes = statement.len(), "Submitting statement");
        let response = self
            .client
            .post(&self.statement_url)
            .header("X-Trino-User", &self.user)
            .header("X-Trino-Catalog", &self.catalog)
            .header("X-Trino-Schema", &self.schema)
            .body(statement.to_string())
            .send()
            .await
            .map_err(|e| LoadError::Sink(format!("statement submit failed: {e}")))?;

        let mut body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LoadError::Sink(format!("unreadable statement response: {e}")))?;

        // Drive the query to completion; Trino reports failure in the body,
        // not the HTTP status
        loop {
            if let Some(error) = body.get("error") {
                let message = error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown query error");
                return Err(LoadError::Sink(message.to_string()));
            }
            let Some(next_uri) = body.get("nextUri").and_then(|u| u.as_str()) else {
                return Ok(());
            };
            let next_uri = next_uri.to_string();
            tokio::time::sleep(POLL_INTERVAL).await;
            body = self
                .client
                .get(&next_uri)
                .header("X-Trino-User", &self.user)
                .send()
                .await
                .map_err(|e| LoadError::Sink(format!("result poll failed: {e}")))?
                .json()
                .await
                .map_err(|e| LoadError::Sink(format!("unreadable result page: {e}")))?;
        }
    }
}

#[async_trait]
impl TableSink for TrinoSink {
    async fn overwrite(&self, batch: &TableBatch) -> Result<usize, LoadError> {
        if batch.rows.is_empty() {
            return Ok(0);
        }
        // Delete-then-insert gives overwrite-by-key without MERGE support
        if let Some(delete) = sql::delete_statement(&self.catalog, &self.schema, batch) {
            self.execute(&delete).await?;
        }
        let insert = sql::insert_statement(&self.catalog, &self.schema, batch);
        self.execute(&insert).await?;
        debug!(
            table = batch.schema.name,
            rows = batch.rows.len(),
            "Batch written"
        );
        Ok(batch.rows.len())
    }
}
