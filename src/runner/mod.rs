//! Transaction execution
//!
//! Drives one submitted program to completion: submit with retry, poll
//! until terminal, then collect the metadata/problems/results payloads.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::client::{ClientError, TransactionClient};
use crate::models::{TransactionRequest, TransactionResponse, TransactionState};
use crate::report::LogBuffer;

/// Marker written to the captured log stream on every submission retry.
/// The report layer scans for it to surface infrastructure flakiness.
pub const SUBMIT_RETRY_MARKER: &str = "transaction submit retry";

/// Runner errors
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The poll loop exceeded the request's timeout budget. The
    /// transaction is left running remotely; no cancel is issued for a
    /// purely client-side timeout.
    #[error("transaction timed out after {0:?}")]
    Timeout(Duration),

    /// Submission kept failing at the transport level.
    #[error("transaction submission failed after {attempts} attempts: {source}")]
    SubmitFailed {
        attempts: u32,
        #[source]
        source: ClientError,
    },

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Runner configuration
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Total submission attempts before giving up
    pub submit_attempts: u32,

    /// Delay between submission attempts. A dropped response may still
    /// have been durably accepted, so the retry waits for the in-flight
    /// submission to land or truly fail rather than resubmitting blindly.
    pub submit_retry_delay: Duration,

    /// Interval between status polls
    pub poll_interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            submit_attempts: 3,
            submit_retry_delay: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Submits and drives a single transaction to completion
pub struct TransactionRunner {
    client: Arc<dyn TransactionClient>,
    config: RunnerConfig,
}

impl TransactionRunner {
    pub fn new(client: Arc<dyn TransactionClient>, config: RunnerConfig) -> Self {
        Self { client, config }
    }

    /// Execute a transaction without a captured log stream.
    pub async fn execute(
        &self,
        request: &TransactionRequest,
    ) -> Result<TransactionResponse, RunnerError> {
        self.execute_logged(request, &LogBuffer::new()).await
    }

    /// Execute a transaction, mirroring retry diagnostics into `logs`.
    pub async fn execute_logged(
        &self,
        request: &TransactionRequest,
        logs: &LogBuffer,
    ) -> Result<TransactionResponse, RunnerError> {
        let transaction_id = self.submit(request, logs).await?;

        match self.drive(&transaction_id, request.timeout).await {
            Ok(response) => Ok(response),
            Err(RunnerError::Timeout(budget)) => Err(RunnerError::Timeout(budget)),
            Err(e) => {
                // Cancel so a failed fetch does not leak a remotely
                // running job.
                if let Err(cancel_err) = self.client.cancel(&transaction_id).await {
                    debug!("best-effort cancel of {transaction_id} failed: {cancel_err}");
                }
                Err(e)
            }
        }
    }

    async fn submit(
        &self,
        request: &TransactionRequest,
        logs: &LogBuffer,
    ) -> Result<String, RunnerError> {
        let mut attempt: u32 = 1;
        loop {
            match self
                .client
                .submit_async(
                    &request.database,
                    &request.engine,
                    &request.program,
                    request.readonly,
                    &request.correlation_id,
                )
                .await
            {
                Ok(id) => {
                    debug!(
                        "submitted transaction {id} to {} on {} (correlation {})",
                        request.database, request.engine, request.correlation_id
                    );
                    return Ok(id);
                }
                Err(e) if attempt >= self.config.submit_attempts => {
                    return Err(RunnerError::SubmitFailed {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    let line = format!("{SUBMIT_RETRY_MARKER}: attempt {attempt} failed: {e}");
                    warn!("{line}");
                    logs.push(line);
                    attempt += 1;
                    sleep(self.config.submit_retry_delay).await;
                }
            }
        }
    }

    async fn drive(
        &self,
        transaction_id: &str,
        budget: Duration,
    ) -> Result<TransactionResponse, RunnerError> {
        let state = self.poll(transaction_id, budget).await?;
        self.finalize(transaction_id, state).await
    }

    async fn poll(
        &self,
        transaction_id: &str,
        budget: Duration,
    ) -> Result<TransactionState, RunnerError> {
        let deadline = Instant::now() + budget;
        loop {
            let state = self.client.get_status(transaction_id).await?;
            if state.is_terminal() {
                debug!("transaction {transaction_id} reached {state}");
                return Ok(state);
            }
            if Instant::now() >= deadline {
                return Err(RunnerError::Timeout(budget));
            }
            sleep(self.config.poll_interval).await;
        }
    }

    async fn finalize(
        &self,
        transaction_id: &str,
        state: TransactionState,
    ) -> Result<TransactionResponse, RunnerError> {
        let (metadata, problems, results) = tokio::join!(
            self.client.get_metadata(transaction_id),
            self.client.get_problems(transaction_id),
            self.client.get_results(transaction_id),
        );

        // A 404 on any payload of a terminal transaction means the engine
        // crashed mid-transaction: a valid ABORTED outcome, not an error.
        let crashed = [
            metadata.as_ref().err(),
            problems.as_ref().err(),
            results.as_ref().err(),
        ]
        .into_iter()
        .flatten()
        .any(ClientError::is_not_found);

        if crashed {
            info!("transaction {transaction_id} lost its engine; reporting as aborted");
            return Ok(TransactionResponse::crashed(transaction_id));
        }

        Ok(TransactionResponse {
            transaction_id: transaction_id.to_string(),
            state,
            metadata: Some(metadata?),
            problems: Some(problems?),
            results: Some(results?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockTransactions;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn runner(client: Arc<MockTransactions>) -> TransactionRunner {
        TransactionRunner::new(client, RunnerConfig::default())
    }

    fn request() -> TransactionRequest {
        TransactionRequest::new("db", "engine", "def output = 1")
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_happy_path() {
        let client = Arc::new(
            MockTransactions::new()
                .running_for(2)
                .with_results(json!({"output": [1]})),
        );

        let response = runner(client.clone()).execute(&request()).await.unwrap();

        assert_eq!(response.state, TransactionState::Completed);
        assert_eq!(response.results, Some(json!({"output": [1]})));
        assert_eq!(client.submits.load(Ordering::SeqCst), 1);
        assert_eq!(client.cancels.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_retries_then_succeeds() {
        let client = Arc::new(MockTransactions::new().failing_submits(2));
        let logs = LogBuffer::new();

        let response = runner(client.clone())
            .execute_logged(&request(), &logs)
            .await
            .unwrap();

        assert_eq!(response.state, TransactionState::Completed);
        assert_eq!(client.submits.load(Ordering::SeqCst), 3);
        assert!(logs.contains(SUBMIT_RETRY_MARKER));
        assert_eq!(logs.lines().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_exhaustion_gives_up() {
        let client = Arc::new(MockTransactions::new().failing_submits(10));

        let result = runner(client.clone()).execute(&request()).await;

        match result {
            Err(RunnerError::SubmitFailed { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected SubmitFailed, got {other:?}"),
        }
        assert_eq!(client.submits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_the_transaction_running() {
        let client = Arc::new(MockTransactions::new().running_for(u32::MAX));
        let request = request().timeout(Duration::from_secs(5));

        let result = runner(client.clone()).execute(&request).await;

        assert!(matches!(result, Err(RunnerError::Timeout(_))));
        // A client-side timeout must not cancel the remote transaction.
        assert_eq!(client.cancels.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_payloads_mean_the_engine_crashed() {
        let client = Arc::new(MockTransactions::new().crashed_payloads());

        let response = runner(client).execute(&request()).await.unwrap();

        assert_eq!(response.state, TransactionState::Aborted);
        assert!(response.metadata.is_none());
        assert!(response.problems.is_none());
        assert!(response.results.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_cancels_the_transaction() {
        let client = Arc::new(MockTransactions::new().broken_payloads());

        let result = runner(client.clone()).execute(&request()).await;

        assert!(matches!(result, Err(RunnerError::Client(_))));
        assert_eq!(client.cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_transaction_still_collects_payloads() {
        let client = Arc::new(
            MockTransactions::new().finishing_as(TransactionState::Aborted),
        );

        let response = runner(client).execute(&request()).await.unwrap();

        assert_eq!(response.state, TransactionState::Aborted);
        assert!(response.problems.is_some());
    }
}
