//! Test steps
//!
//! One step is a single query/assertion unit inside a multi-step test
//! case. Steps are immutable value objects; the orchestrator only ever
//! prepends synthetic setup steps in front of the user-provided list.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::{ExpectedProblem, SeverityThreshold};

/// One unit of a multi-step test case
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Step {
    /// Query text to execute, if any
    #[serde(default)]
    pub query: Option<String>,

    /// Named sources to install before the query runs
    #[serde(default)]
    pub install: BTreeMap<String, String>,

    /// Input bindings injected into the program
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,

    /// Expected result bindings, compared against the returned results
    #[serde(default)]
    pub expected: BTreeMap<String, Value>,

    /// Problems that must be reported by this step
    #[serde(default)]
    pub expected_problems: Vec<ExpectedProblem>,

    /// Known-broken step: failures are recorded as expected
    #[serde(default)]
    pub broken: bool,

    /// The transaction is expected to abort
    #[serde(default)]
    pub expect_abort: bool,

    /// Submit the transaction read-only
    #[serde(default)]
    pub readonly: bool,

    /// Severity threshold for tolerated unexpected problems
    #[serde(default)]
    pub allow_unexpected: SeverityThreshold,

    /// Per-step timeout override in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Step {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn install(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.install.insert(name.into(), source.into());
        self
    }

    pub fn input(mut self, name: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    pub fn expect(mut self, name: impl Into<String>, value: Value) -> Self {
        self.expected.insert(name.into(), value);
        self
    }

    pub fn expect_problem(mut self, problem: ExpectedProblem) -> Self {
        self.expected_problems.push(problem);
        self
    }

    pub fn broken(mut self, broken: bool) -> Self {
        self.broken = broken;
        self
    }

    pub fn expect_abort(mut self, expect_abort: bool) -> Self {
        self.expect_abort = expect_abort;
        self
    }

    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn allow_unexpected(mut self, threshold: SeverityThreshold) -> Self {
        self.allow_unexpected = threshold;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Whether the step carries anything to execute at all.
    pub fn is_empty(&self) -> bool {
        self.query.as_deref().map_or(true, |q| q.trim().is_empty())
            && self.install.is_empty()
            && self.inputs.is_empty()
    }
}
