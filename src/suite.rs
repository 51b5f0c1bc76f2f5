//! Parallel suite execution
//!
//! Fans test cases out as background children of one root node, capped by
//! a semaphore so a large suite does not swamp the engine pool's
//! admission queue.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

use crate::models::Step;
use crate::orchestrator::{CaseOptions, TestOrchestrator};
use crate::report::{ResultNode, TestNode};

/// One named test case queued for a suite run
#[derive(Clone, Debug, Default)]
pub struct CaseSpec {
    pub name: String,
    pub steps: Vec<Step>,
    pub options: CaseOptions,
}

impl CaseSpec {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
            options: CaseOptions::default(),
        }
    }

    pub fn options(mut self, options: CaseOptions) -> Self {
        self.options = options;
        self
    }
}

/// Runs a batch of test cases concurrently against one orchestrator
pub struct SuiteRunner {
    orchestrator: Arc<TestOrchestrator>,
    max_concurrent: usize,
}

impl SuiteRunner {
    pub fn new(orchestrator: Arc<TestOrchestrator>, max_concurrent: usize) -> Self {
        Self {
            orchestrator,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Run every case and return the finalized suite report.
    pub async fn run(&self, description: &str, cases: Vec<CaseSpec>) -> ResultNode {
        info!(
            "running {} test cases, at most {} concurrent",
            cases.len(),
            self.max_concurrent
        );

        let root = TestNode::root(description);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        for case in cases {
            let orchestrator = Arc::clone(&self.orchestrator);
            let semaphore = Arc::clone(&semaphore);
            root.spawn_child(case.name.clone(), move |node| async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("suite semaphore closed");
                orchestrator
                    .run_case_into(&node, case.steps, &case.options)
                    .await;
            });
        }

        let report = root.finish().await;
        info!("{report}");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{MockDatabases, MockProvisioning, MockTransactions};
    use crate::orchestrator::OrchestratorConfig;
    use crate::pool::{EnginePool, PoolConfig};
    use crate::runner::{RunnerConfig, TransactionRunner};
    use serde_json::json;

    async fn orchestrator(engines: usize) -> Arc<TestOrchestrator> {
        let provisioning = Arc::new(MockProvisioning::new());
        let pool = Arc::new(EnginePool::new(provisioning, PoolConfig::default()));
        pool.resize(engines, None).await.unwrap();

        let transactions = Arc::new(
            MockTransactions::new().with_results(json!({"output": [1]})),
        );
        let runner = Arc::new(TransactionRunner::new(transactions, RunnerConfig::default()));
        Arc::new(TestOrchestrator::new(
            pool,
            runner,
            Arc::new(MockDatabases::new()),
            OrchestratorConfig::default(),
        ))
    }

    fn passing_case(name: &str) -> CaseSpec {
        CaseSpec::new(
            name,
            vec![Step::new().query("def output = 1").expect("output", json!([1]))],
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_suite_runs_every_case() {
        let runner = SuiteRunner::new(orchestrator(2).await, 4);
        let cases = vec![
            passing_case("case a"),
            passing_case("case b"),
            passing_case("case c"),
        ];

        let report = runner.run("smoke suite", cases).await;

        assert_eq!(report.children.len(), 3);
        assert!(report.passed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_suite_with_more_cases_than_slots() {
        let runner = SuiteRunner::new(orchestrator(1).await, 1);
        let cases: Vec<CaseSpec> = (0..5).map(|i| passing_case(&format!("case {i}"))).collect();

        let report = runner.run("serialized suite", cases).await;

        assert_eq!(report.children.len(), 5);
        assert!(report.passed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_case_fails_the_suite() {
        let runner = SuiteRunner::new(orchestrator(1).await, 2);
        let cases = vec![
            passing_case("passing"),
            CaseSpec::new(
                "failing",
                vec![Step::new().query("def output = 1").expect("output", json!([2]))],
            ),
        ];

        let report = runner.run("mixed suite", cases).await;

        assert!(!report.passed());
        assert_eq!(report.counts().failed, 1);
    }
}
