//! Service client traits
//!
//! Contracts for the three remote collaborators the harness drives:
//! engine provisioning, transaction execution and database management.
//! The HTTP implementations live in [`http`]; tests inject in-memory
//! mocks through the same traits.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{EngineInfo, Problem, TransactionState};

pub mod http;
#[cfg(test)]
pub(crate) mod mock;

pub use http::{HttpServiceClient, ServiceConfig};

/// Errors surfaced by service clients
#[derive(Error, Debug)]
pub enum ClientError {
    /// The resource does not exist (or no longer exists) on the service.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport-level failure: connection refused, timeout, dropped
    /// response. The request may or may not have been accepted remotely.
    #[error("request failed: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("service error ({status}): {message}")]
    Service { status: u16, message: String },
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

/// Engine provisioning API
#[async_trait]
pub trait ProvisioningClient: Send + Sync {
    /// Request creation of a named engine of the given size.
    async fn create_engine(&self, name: &str, size: &str) -> Result<(), ClientError>;

    /// Fetch the current state of an engine. Errors `NotFound` if the
    /// engine does not exist.
    async fn get_engine(&self, name: &str) -> Result<EngineInfo, ClientError>;

    /// Delete an engine. Deleting an already-gone engine errors
    /// `NotFound`; callers treat that as success where appropriate.
    async fn delete_engine(&self, name: &str) -> Result<(), ClientError>;
}

/// Transaction execution API
#[async_trait]
pub trait TransactionClient: Send + Sync {
    /// Submit a program asynchronously; returns the transaction id.
    async fn submit_async(
        &self,
        database: &str,
        engine: &str,
        program: &str,
        readonly: bool,
        correlation_id: &str,
    ) -> Result<String, ClientError>;

    /// Current state of a transaction.
    async fn get_status(&self, transaction_id: &str) -> Result<TransactionState, ClientError>;

    /// Metadata payload for a terminal transaction. `NotFound` when the
    /// owning engine crashed.
    async fn get_metadata(&self, transaction_id: &str)
        -> Result<serde_json::Value, ClientError>;

    /// Problems reported by a terminal transaction.
    async fn get_problems(&self, transaction_id: &str) -> Result<Vec<Problem>, ClientError>;

    /// Result bindings of a terminal transaction.
    async fn get_results(&self, transaction_id: &str) -> Result<serde_json::Value, ClientError>;

    /// Best-effort cancel of a running transaction.
    async fn cancel(&self, transaction_id: &str) -> Result<(), ClientError>;
}

/// Ephemeral database API
#[async_trait]
pub trait DatabaseProvisioner: Send + Sync {
    /// Create a database, optionally cloned from a template.
    async fn create(&self, name: &str, clone_source: Option<&str>) -> Result<(), ClientError>;

    /// Delete a database.
    async fn delete(&self, name: &str) -> Result<(), ClientError>;
}
