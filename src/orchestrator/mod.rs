//! Test case orchestration
//!
//! Runs one test case end to end: lease an engine from the pool, create
//! an ephemeral database, execute each step through the transaction
//! runner, evaluate expectations into the result tree, and guarantee
//! engine release and database deletion on every exit path.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::DatabaseProvisioner;
use crate::models::{Step, TransactionRequest, TransactionResponse, TransactionState};
use crate::pool::EnginePool;
use crate::report::TestNode;
use crate::runner::TransactionRunner;
use crate::utils::unique_id;

/// Composes executable program text for a step
///
/// Rendering of the query language (input loading, output bindings,
/// installed sources) lives outside this crate; implementors translate a
/// step's dictionaries into statements. The default builder passes the
/// query text through untouched and adds no setup steps.
pub trait ProgramBuilder: Send + Sync {
    /// Synthetic setup steps to prepend before the user's steps
    /// (configuration, installs, input loading).
    fn setup_steps(&self, steps: &[Step]) -> Vec<Step>;

    /// The full program text for one step. Empty means nothing to run.
    fn compose(&self, step: &Step) -> String;
}

/// Pass-through builder: the step's query text is the program.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultProgramBuilder;

impl ProgramBuilder for DefaultProgramBuilder {
    fn setup_steps(&self, _steps: &[Step]) -> Vec<Step> {
        Vec::new()
    }

    fn compose(&self, step: &Step) -> String {
        step.query.clone().unwrap_or_default()
    }
}

/// Per-case options
#[derive(Clone, Debug, Default)]
pub struct CaseOptions {
    /// Use this engine instead of leasing one from the pool
    pub engine: Option<String>,

    /// Clone the ephemeral database from a template
    pub clone_source: Option<String>,

    /// The whole case is expected to fail
    pub broken: bool,
}

/// Orchestrator defaults, plain values handed in by the config layer
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Timeout for steps that do not carry their own
    pub default_timeout: Duration,

    /// Base name for generated ephemeral databases
    pub database_base: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(300),
            database_base: "txq-db".to_string(),
        }
    }
}

/// Runs test cases against leased engines and ephemeral databases
pub struct TestOrchestrator {
    pool: Arc<EnginePool>,
    runner: Arc<TransactionRunner>,
    databases: Arc<dyn DatabaseProvisioner>,
    programs: Arc<dyn ProgramBuilder>,
    config: OrchestratorConfig,
}

impl TestOrchestrator {
    pub fn new(
        pool: Arc<EnginePool>,
        runner: Arc<TransactionRunner>,
        databases: Arc<dyn DatabaseProvisioner>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            pool,
            runner,
            databases,
            programs: Arc::new(DefaultProgramBuilder),
            config,
        }
    }

    /// Swap in a query-language-aware program builder.
    pub fn with_program_builder(mut self, programs: Arc<dyn ProgramBuilder>) -> Self {
        self.programs = programs;
        self
    }

    /// Run one test case as a child of `parent` and finalize it.
    pub async fn run_case(
        &self,
        parent: &TestNode,
        name: &str,
        steps: Vec<Step>,
        options: CaseOptions,
    ) -> crate::report::ResultNode {
        let node = parent.child(name);
        self.run_case_into(&node, steps, &options).await;
        node.finish().await
    }

    /// Run one test case, recording into an existing node. Used for
    /// background (task-spawned) cases where the node is detached.
    pub async fn run_case_into(&self, node: &TestNode, steps: Vec<Step>, options: &CaseOptions) {
        if options.broken {
            node.mark_broken();
        }
        if let Err(e) = self.run_case_inner(node, steps, options).await {
            node.set_error(format!("{e:#}"));
        }
    }

    async fn run_case_inner(
        &self,
        node: &TestNode,
        steps: Vec<Step>,
        options: &CaseOptions,
    ) -> Result<()> {
        let lease = self
            .pool
            .acquire_scoped(options.engine.as_deref())
            .await
            .context("failed to lease an engine")?;
        let engine = lease.name().to_string();

        let database = unique_id(&self.config.database_base);
        node.log(format!("engine {engine}, database {database}"));

        self.databases
            .create(&database, options.clone_source.as_deref())
            .await
            .with_context(|| format!("failed to create database {database}"))?;

        let run = self.run_steps(node, &engine, &database, steps).await;

        // Cleanup happens whatever the steps did; the lease returns to
        // the pool when it drops.
        if let Err(e) = self.databases.delete(&database).await {
            warn!("cleanup of database {database} failed: {e}");
        }
        drop(lease);

        run.with_context(|| format!("engine {engine}, database {database}"))
    }

    async fn run_steps(
        &self,
        node: &TestNode,
        engine: &str,
        database: &str,
        steps: Vec<Step>,
    ) -> Result<()> {
        let mut all_steps = self.programs.setup_steps(&steps);
        all_steps.extend(steps);

        for (index, step) in all_steps.iter().enumerate() {
            let label = format!("step {}", index + 1);

            let program = self.programs.compose(step);
            if program.trim().is_empty() {
                debug!("{label}: empty program, skipping execution");
                continue;
            }

            let timeout = step
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(self.config.default_timeout);
            let request = TransactionRequest::new(database, engine, program)
                .readonly(step.readonly)
                .timeout(timeout);

            // An execution error short-circuits the remaining steps.
            let response = self
                .runner
                .execute_logged(&request, node.logs())
                .await
                .with_context(|| format!("{label} execution failed"))?;

            if step.broken {
                let step_node = node.child(&label);
                step_node.mark_broken();
                evaluate_step(&step_node, &label, step, &response);
                step_node.finish().await;
            } else {
                evaluate_step(node, &label, step, &response);
            }
        }
        Ok(())
    }
}

/// Evaluate one step's expectations against a terminal response.
fn evaluate_step(node: &TestNode, label: &str, step: &Step, response: &TransactionResponse) {
    let problems = response.problems.clone().unwrap_or_default();
    let mut matched = vec![false; problems.len()];

    // Every expected problem must appear, each consuming one report.
    for expected in &step.expected_problems {
        let found = problems
            .iter()
            .enumerate()
            .find(|(i, problem)| !matched[*i] && expected.matches(problem));
        match found {
            Some((i, _)) => {
                matched[i] = true;
                node.record_pass(format!("{label}: problem {}", expected.code));
            }
            None => {
                node.record_fail(
                    format!("{label}: problem {}", expected.code),
                    "expected problem not reported",
                );
            }
        }
    }

    // Unmatched problems fail unless their severity is tolerated.
    let mut unexpected_failures = 0usize;
    for (i, problem) in problems.iter().enumerate() {
        if matched[i] {
            continue;
        }
        if step.allow_unexpected.allows(problem.effective_severity()) {
            debug!("{label}: tolerated unexpected problem {problem}");
        } else {
            unexpected_failures += 1;
            node.record_fail(
                format!("{label}: unexpected problem {}", problem.code),
                problem.to_string(),
            );
        }
    }

    if step.expect_abort {
        if response.state == TransactionState::Aborted {
            node.record_pass(format!("{label}: transaction aborted as expected"));
        } else {
            node.record_fail(
                format!("{label}: transaction aborted as expected"),
                format!("expected ABORTED, got {}", response.state),
            );
        }
        return;
    }

    if response.state == TransactionState::Completed && unexpected_failures == 0 {
        node.record_pass(format!("{label}: transaction completed"));
    } else if response.state != TransactionState::Completed {
        node.record_fail(
            format!("{label}: transaction completed"),
            format!("expected COMPLETED, got {}", response.state),
        );
    }

    let empty = serde_json::Value::Object(Default::default());
    let results = response.results.as_ref().unwrap_or(&empty);
    for (name, expected_value) in &step.expected {
        let description = format!("{label}: result {name}");
        match results.get(name) {
            Some(actual) if actual == expected_value => node.record_pass(description),
            Some(actual) => node.record_fail(
                description,
                format!("expected {expected_value}, got {actual}"),
            ),
            None => node.record_fail(description, "missing expected result"),
        }
    }
}
