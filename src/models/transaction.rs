//! Transaction request and response types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::Problem;
use crate::utils::unique_id;

/// State reported by the service for a transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionState {
    Running,
    Completed,
    Aborted,
}

impl TransactionState {
    /// Terminal means the service will not change the state anymore.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionState::Running)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Running => write!(f, "RUNNING"),
            TransactionState::Completed => write!(f, "COMPLETED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// A single transaction submission, immutable once constructed
#[derive(Clone, Debug)]
pub struct TransactionRequest {
    /// Target database name
    pub database: String,

    /// Target engine name
    pub engine: String,

    /// Full program text, setup statements already injected
    pub program: String,

    /// Submit read-only
    pub readonly: bool,

    /// Correlation id attached to the submission for idempotent retry
    pub correlation_id: String,

    /// Total time budget for the poll loop
    pub timeout: Duration,
}

impl TransactionRequest {
    pub fn new(
        database: impl Into<String>,
        engine: impl Into<String>,
        program: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            engine: engine.into(),
            program: program.into(),
            readonly: false,
            correlation_id: unique_id("txn"),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Terminal response for one transaction
///
/// A crashed engine may produce a terminal state with no payloads at all,
/// so metadata, problems and results are independently optional.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionResponse {
    /// Transaction id assigned by the service
    pub transaction_id: String,

    /// Terminal state, `Completed` or `Aborted`
    pub state: TransactionState,

    /// Metadata payload
    pub metadata: Option<serde_json::Value>,

    /// Problems reported during execution
    pub problems: Option<Vec<Problem>>,

    /// Result bindings keyed by output name
    pub results: Option<serde_json::Value>,
}

impl TransactionResponse {
    /// Response shape for an engine that crashed mid-transaction: the
    /// transaction is terminal but none of the payloads exist anymore.
    pub fn crashed(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            state: TransactionState::Aborted,
            metadata: None,
            problems: None,
            results: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TransactionState::Running.is_terminal());
        assert!(TransactionState::Completed.is_terminal());
        assert!(TransactionState::Aborted.is_terminal());
    }

    #[test]
    fn test_request_builder() {
        let request = TransactionRequest::new("db", "engine", "def output = 1")
            .readonly(true)
            .timeout(Duration::from_secs(60));

        assert_eq!(request.database, "db");
        assert!(request.readonly);
        assert_eq!(request.timeout, Duration::from_secs(60));
        assert!(request.correlation_id.starts_with("txn"));
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = TransactionRequest::new("db", "e", "q");
        let b = TransactionRequest::new("db", "e", "q");
        assert_ne!(a.correlation_id, b.correlation_id);
    }

    #[test]
    fn test_crashed_response() {
        let response = TransactionResponse::crashed("txn-1");
        assert_eq!(response.state, TransactionState::Aborted);
        assert!(response.metadata.is_none());
        assert!(response.problems.is_none());
        assert!(response.results.is_none());
    }
}
