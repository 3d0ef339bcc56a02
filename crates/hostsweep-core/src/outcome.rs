//! Per-host results and report rows

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CollectError;

/// One report row contributed by a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub hostname: String,
    /// Column/value pairs in display order
    pub fields: Vec<(String, String)>,
}

impl Record {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            fields: Vec::new(),
        }
    }

    /// Append a column; a repeated column name replaces the earlier value
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl ToString) {
        let column = column.into();
        let value = value.to_string();
        match self.fields.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((column, value)),
        }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }
}

/// Which failure channel a host landed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    ConnectFailure,
    CollectionError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ConnectFailure => f.write_str("connect_failure"),
            FailureKind::CollectionError => f.write_str("collection_error"),
        }
    }
}

/// Result of one collection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(Vec<Record>),
    ConnectFailure(String),
    CollectionError(String),
}

/// Outcome attributed to the host it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOutcome {
    pub hostname: String,
    pub outcome: Outcome,
}

impl HostOutcome {
    pub fn success(hostname: impl Into<String>, rows: Vec<Record>) -> Self {
        Self {
            hostname: hostname.into(),
            outcome: Outcome::Success(rows),
        }
    }

    pub fn connect_failure(hostname: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            outcome: Outcome::ConnectFailure(detail.into()),
        }
    }

    pub fn collection_error(hostname: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            outcome: Outcome::CollectionError(detail.into()),
        }
    }

    /// Fold an operation result into an outcome for `hostname`
    pub fn from_result(
        hostname: impl Into<String>,
        result: Result<Vec<Record>, CollectError>,
    ) -> Self {
        let hostname = hostname.into();
        match result {
            Ok(rows) => Self::success(hostname, rows),
            Err(CollectError::Connect(detail)) => Self::connect_failure(hostname, detail),
            Err(CollectError::Operation(detail)) => Self::collection_error(hostname, detail),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    /// Failure channel, `None` on success
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self.outcome {
            Outcome::Success(_) => None,
            Outcome::ConnectFailure(_) => Some(FailureKind::ConnectFailure),
            Outcome::CollectionError(_) => Some(FailureKind::CollectionError),
        }
    }

    #[must_use]
    pub fn error_detail(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success(_) => None,
            Outcome::ConnectFailure(d) | Outcome::CollectionError(d) => Some(d.as_str()),
        }
    }
}
