//! In-memory service mocks for tests
//!
//! Scriptable implementations of the client traits. Failure injection is
//! counter-based so tests can express "fail twice, then succeed".

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use super::{ClientError, DatabaseProvisioner, ProvisioningClient, TransactionClient};
use crate::models::{EngineInfo, EngineState, Problem, TransactionState};

/// Provisioning API backed by a map of engine states
#[derive(Default)]
pub struct MockProvisioning {
    pub engines: Mutex<HashMap<String, EngineState>>,
    /// Engine names whose creation lands in `ProvisionFailed`
    pub failing: Mutex<HashSet<String>>,
    pub deleted: Mutex<Vec<String>>,
}

impl MockProvisioning {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_provisioning(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn set_state(&self, name: &str, state: EngineState) {
        self.engines.lock().unwrap().insert(name.to_string(), state);
    }

    pub fn deleted_names(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProvisioningClient for MockProvisioning {
    async fn create_engine(&self, name: &str, _size: &str) -> Result<(), ClientError> {
        let state = if self.failing.lock().unwrap().contains(name) {
            EngineState::ProvisionFailed
        } else {
            EngineState::Provisioned
        };
        self.engines.lock().unwrap().insert(name.to_string(), state);
        Ok(())
    }

    async fn get_engine(&self, name: &str) -> Result<EngineInfo, ClientError> {
        self.engines
            .lock()
            .unwrap()
            .get(name)
            .map(|state| EngineInfo {
                name: name.to_string(),
                state: *state,
            })
            .ok_or_else(|| ClientError::NotFound(format!("engine {name}")))
    }

    async fn delete_engine(&self, name: &str) -> Result<(), ClientError> {
        self.deleted.lock().unwrap().push(name.to_string());
        match self.engines.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(ClientError::NotFound(format!("engine {name}"))),
        }
    }
}

/// Transaction API driving every submission through one scripted outcome
pub struct MockTransactions {
    /// Transport failures injected before a submit succeeds
    pub submit_failures: AtomicU32,
    /// Status polls answered `Running` before the final state
    pub running_polls: AtomicU32,
    pub final_state: TransactionState,
    pub results: serde_json::Value,
    pub problems: Vec<Problem>,
    /// Answer every payload fetch with 404 (crashed engine)
    pub payloads_not_found: AtomicBool,
    /// Answer every payload fetch with a transport error
    pub payloads_fail: AtomicBool,
    pub submits: AtomicU32,
    pub cancels: AtomicU32,
}

impl Default for MockTransactions {
    fn default() -> Self {
        Self {
            submit_failures: AtomicU32::new(0),
            running_polls: AtomicU32::new(0),
            final_state: TransactionState::Completed,
            results: serde_json::json!({}),
            problems: Vec::new(),
            payloads_not_found: AtomicBool::new(false),
            payloads_fail: AtomicBool::new(false),
            submits: AtomicU32::new(0),
            cancels: AtomicU32::new(0),
        }
    }
}

impl MockTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_submits(self, count: u32) -> Self {
        self.submit_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn running_for(self, polls: u32) -> Self {
        self.running_polls.store(polls, Ordering::SeqCst);
        self
    }

    pub fn finishing_as(mut self, state: TransactionState) -> Self {
        self.final_state = state;
        self
    }

    pub fn with_results(mut self, results: serde_json::Value) -> Self {
        self.results = results;
        self
    }

    pub fn with_problems(mut self, problems: Vec<Problem>) -> Self {
        self.problems = problems;
        self
    }

    pub fn crashed_payloads(self) -> Self {
        self.payloads_not_found.store(true, Ordering::SeqCst);
        self
    }

    pub fn broken_payloads(self) -> Self {
        self.payloads_fail.store(true, Ordering::SeqCst);
        self
    }

    fn payload_error(&self) -> Option<ClientError> {
        if self.payloads_not_found.load(Ordering::SeqCst) {
            Some(ClientError::NotFound("payload".to_string()))
        } else if self.payloads_fail.load(Ordering::SeqCst) {
            Some(ClientError::Transport("connection reset".to_string()))
        } else {
            None
        }
    }
}

#[async_trait]
impl TransactionClient for MockTransactions {
    async fn submit_async(
        &self,
        _database: &str,
        _engine: &str,
        _program: &str,
        _readonly: bool,
        _correlation_id: &str,
    ) -> Result<String, ClientError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        let remaining = self.submit_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.submit_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ClientError::Transport("connection refused".to_string()));
        }
        Ok("txn-1".to_string())
    }

    async fn get_status(&self, _transaction_id: &str) -> Result<TransactionState, ClientError> {
        let remaining = self.running_polls.load(Ordering::SeqCst);
        if remaining > 0 {
            self.running_polls.store(remaining - 1, Ordering::SeqCst);
            return Ok(TransactionState::Running);
        }
        Ok(self.final_state)
    }

    async fn get_metadata(
        &self,
        _transaction_id: &str,
    ) -> Result<serde_json::Value, ClientError> {
        match self.payload_error() {
            Some(e) => Err(e),
            None => Ok(serde_json::json!({})),
        }
    }

    async fn get_problems(&self, _transaction_id: &str) -> Result<Vec<Problem>, ClientError> {
        match self.payload_error() {
            Some(e) => Err(e),
            None => Ok(self.problems.clone()),
        }
    }

    async fn get_results(&self, _transaction_id: &str) -> Result<serde_json::Value, ClientError> {
        match self.payload_error() {
            Some(e) => Err(e),
            None => Ok(self.results.clone()),
        }
    }

    async fn cancel(&self, _transaction_id: &str) -> Result<(), ClientError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Database API recording create and delete calls
#[derive(Default)]
pub struct MockDatabases {
    pub created: Mutex<Vec<(String, Option<String>)>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_create: AtomicBool,
}

impl MockDatabases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_names(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn deleted_names(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl DatabaseProvisioner for MockDatabases {
    async fn create(&self, name: &str, clone_source: Option<&str>) -> Result<(), ClientError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ClientError::Service {
                status: 409,
                message: "database quota exceeded".to_string(),
            });
        }
        self.created
            .lock()
            .unwrap()
            .push((name.to_string(), clone_source.map(str::to_string)));
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ClientError> {
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }
}
