//! osquery client for inventory collection

use std::sync::Arc;
use std::time::Duration;

use hostsweep_exec::shell::quote;
use hostsweep_exec::{CommandResult, RemoteExecutor};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::InventoryError;
use crate::query::Query;

/// Exit status a POSIX shell reports for an unknown command
const COMMAND_NOT_FOUND: i32 = 127;

/// Runs `osqueryi --json` through an executor
pub struct OsqueryClient {
    executor: Arc<dyn RemoteExecutor>,
    timeout: Duration,
}

impl OsqueryClient {
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            executor,
            timeout: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Execute a raw SQL statement and return the JSON rows.
    ///
    /// # Errors
    /// Returns [`InventoryError::Execution`] if the transport fails, a
    /// classified error if osqueryi reports failure, and
    /// [`InventoryError::ParseError`] if its output is not a JSON array.
    #[instrument(skip(self, sql), fields(query = %sql))]
    pub async fn query_raw(&self, sql: &str) -> Result<Vec<Value>, InventoryError> {
        debug!("executing osquery");

        let cmd = format!("osqueryi --json {}", quote(sql));
        let result = self.executor.run_with_timeout(&cmd, self.timeout).await?;

        if !result.success() {
            return Err(classify_failure(sql, &result));
        }

        let json: Vec<Value> = serde_json::from_str(&result.stdout)
            .map_err(|e| InventoryError::ParseError(e.to_string()))?;

        debug!(rows = json.len(), "query completed");
        Ok(json)
    }

    /// Execute a query and deserialize each row.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row does not match `T`.
    pub async fn query<T: DeserializeOwned>(
        &self,
        query: &Query,
    ) -> Result<Vec<T>, InventoryError> {
        self.query_raw(&query.build())
            .await?
            .into_iter()
            .map(|value| {
                serde_json::from_value(value).map_err(|e| InventoryError::ParseError(e.to_string()))
            })
            .collect()
    }

    /// Like [`query`](Self::query) for single-row tables
    ///
    /// # Errors
    /// Returns [`InventoryError::ParseError`] if the table returned no rows.
    pub async fn query_one<T: DeserializeOwned>(&self, query: &Query) -> Result<T, InventoryError> {
        self.query(query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| InventoryError::ParseError(format!("no {} data", query.table())))
    }
}

fn classify_failure(sql: &str, result: &CommandResult) -> InventoryError {
    let stderr = result.stderr.trim();
    let lower = stderr.to_lowercase();

    if result.status == COMMAND_NOT_FOUND || lower.contains("osqueryi: not found") {
        InventoryError::OsqueryNotFound("osqueryi not found on target system".to_string())
    } else if lower.contains("no such table") {
        let table = extract_table_name(sql).unwrap_or_else(|| "unknown".to_string());
        InventoryError::TableNotAvailable(table)
    } else if lower.contains("syntax error") {
        InventoryError::SqlSyntax(stderr.to_string())
    } else {
        InventoryError::QueryFailed(stderr.to_string())
    }
}

/// Table named after the first FROM
fn extract_table_name(sql: &str) -> Option<String> {
    let pos = sql.to_lowercase().find("from ")?;
    let after_from = &sql[pos + 5..];
    let end = after_from
        .find(|c: char| c.is_whitespace() || c == ';')
        .unwrap_or(after_from.len());
    Some(after_from[..end].trim().to_string())
}
