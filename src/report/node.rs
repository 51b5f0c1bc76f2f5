//! Hierarchical test-result aggregation
//!
//! `TestNode` is the live, concurrency-safe recorder a running test
//! writes into; `ResultNode` is the immutable snapshot produced exactly
//! once by `finish`. Nodes nest, may own background (task-spawned)
//! children that are merged at finish, and support "expected failure"
//! (broken) inversion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::runner::SUBMIT_RETRY_MARKER;

/// Outcome of one recorded assertion
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Error,
    Broken,
}

impl Outcome {
    pub fn symbol(&self) -> &'static str {
        match self {
            Outcome::Pass => "✓",
            Outcome::Fail => "✗",
            Outcome::Error => "!",
            Outcome::Broken => "~",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => write!(f, "PASS"),
            Outcome::Fail => write!(f, "FAIL"),
            Outcome::Error => write!(f, "ERROR"),
            Outcome::Broken => write!(f, "BROKEN"),
        }
    }
}

/// One recorded assertion
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Assertion {
    pub description: String,
    pub outcome: Outcome,
    pub message: Option<String>,
}

/// Recursive outcome counts for a node and its subtree
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub broken: usize,
}

impl Counts {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errored + self.broken
    }

    fn add(&mut self, other: Counts) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.errored += other.errored;
        self.broken += other.broken;
    }
}

/// Finalized result tree node
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultNode {
    pub description: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub broken: bool,
    pub assertions: Vec<Assertion>,
    pub children: Vec<ResultNode>,
    pub logs: Vec<String>,
    /// Terminal error that aborted the node, if any
    pub error: Option<String>,
}

impl ResultNode {
    /// Outcome counts over this node and all children.
    pub fn counts(&self) -> Counts {
        let mut counts = Counts::default();
        for assertion in &self.assertions {
            match assertion.outcome {
                Outcome::Pass => counts.passed += 1,
                Outcome::Fail => counts.failed += 1,
                Outcome::Error => counts.errored += 1,
                Outcome::Broken => counts.broken += 1,
            }
        }
        if self.error.is_some() {
            counts.errored += 1;
        }
        for child in &self.children {
            counts.add(child.counts());
        }
        counts
    }

    pub fn passed(&self) -> bool {
        let counts = self.counts();
        counts.failed == 0 && counts.errored == 0
    }

    /// Convert every failure and error in the subtree into a broken
    /// (expected-failure) result.
    pub(crate) fn invert_failures(&mut self) {
        for assertion in &mut self.assertions {
            if matches!(assertion.outcome, Outcome::Fail | Outcome::Error) {
                assertion.outcome = Outcome::Broken;
            }
        }
        if let Some(message) = self.error.take() {
            self.assertions.push(Assertion {
                description: self.description.clone(),
                outcome: Outcome::Broken,
                message: Some(message),
            });
        }
        for child in &mut self.children {
            child.invert_failures();
        }
    }

    /// Indented one-line-per-node rendering for CLI output.
    pub fn format_tree(&self, indent: usize) -> String {
        let pad = "  ".repeat(indent);
        let counts = self.counts();
        let mut output = format!(
            "{pad}{} {} — {} passed, {} failed, {} errored, {} broken\n",
            if self.passed() { "✓" } else { "✗" },
            self.description,
            counts.passed,
            counts.failed,
            counts.errored,
            counts.broken
        );
        for assertion in &self.assertions {
            output.push_str(&format!(
                "{pad}  {} {}{}\n",
                assertion.outcome.symbol(),
                assertion.description,
                assertion
                    .message
                    .as_deref()
                    .map(|m| format!(" — {m}"))
                    .unwrap_or_default()
            ));
        }
        if let Some(error) = &self.error {
            output.push_str(&format!("{pad}  ! {error}\n"));
        }
        for child in &self.children {
            output.push_str(&child.format_tree(indent + 1));
        }
        output
    }
}

impl fmt::Display for ResultNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = self.counts();
        write!(
            f,
            "{} {} — {}/{} passed ({} failed, {} errored, {} broken)",
            if self.passed() { "✓" } else { "✗" },
            self.description,
            counts.passed,
            counts.total(),
            counts.failed,
            counts.errored,
            counts.broken
        )
    }
}

/// Shared, appendable log stream captured per node
#[derive(Clone, Debug, Default)]
pub struct LogBuffer {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        self.lines.lock().unwrap().push(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, marker: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|l| l.contains(marker))
    }
}

struct NodeInner {
    description: String,
    started_at: DateTime<Utc>,
    broken: bool,
    assertions: Vec<Assertion>,
    children: Vec<ResultNode>,
    pending: Vec<JoinHandle<ResultNode>>,
    parent: Option<TestNode>,
    error: Option<String>,
    finished: Option<ResultNode>,
}

/// Live recorder for one test node
///
/// Cheap to clone; all clones share the same underlying node. Mutations
/// are serialized by an internal lock, so concurrently running steps and
/// background children can record freely.
#[derive(Clone)]
pub struct TestNode {
    inner: Arc<Mutex<NodeInner>>,
    logs: LogBuffer,
}

impl TestNode {
    /// Create a root (or detached) node.
    pub fn root(description: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(NodeInner {
                description: description.into(),
                started_at: Utc::now(),
                broken: false,
                assertions: Vec::new(),
                children: Vec::new(),
                pending: Vec::new(),
                parent: None,
                error: None,
                finished: None,
            })),
            logs: LogBuffer::new(),
        }
    }

    /// Create a nested child; it merges into this node when it finishes.
    pub fn child(&self, description: impl Into<String>) -> Self {
        let child = Self::root(description);
        child.inner.lock().unwrap().parent = Some(self.clone());
        child
    }

    /// Mark this node as expected-to-fail. Failures and errors recorded
    /// afterwards are converted to broken results.
    pub fn mark_broken(&self) {
        self.inner.lock().unwrap().broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.inner.lock().unwrap().broken
    }

    pub fn description(&self) -> String {
        self.inner.lock().unwrap().description.clone()
    }

    /// The node's captured log stream.
    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    pub fn log(&self, line: impl Into<String>) {
        self.logs.push(line);
    }

    /// Record one assertion outcome.
    pub fn record(
        &self,
        outcome: Outcome,
        description: impl Into<String>,
        message: Option<String>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        if inner.finished.is_some() {
            debug!("record after finish ignored: {}", inner.description);
            return;
        }
        let outcome = if inner.broken && matches!(outcome, Outcome::Fail | Outcome::Error) {
            Outcome::Broken
        } else {
            outcome
        };
        inner.assertions.push(Assertion {
            description: description.into(),
            outcome,
            message,
        });
    }

    pub fn record_pass(&self, description: impl Into<String>) {
        self.record(Outcome::Pass, description, None);
    }

    pub fn record_fail(&self, description: impl Into<String>, message: impl Into<String>) {
        self.record(Outcome::Fail, description, Some(message.into()));
    }

    pub fn record_error(&self, description: impl Into<String>, message: impl Into<String>) {
        self.record(Outcome::Error, description, Some(message.into()));
    }

    /// Set the terminal error message that aborted this node.
    pub fn set_error(&self, message: impl Into<String>) {
        self.inner.lock().unwrap().error = Some(message.into());
    }

    /// Run `body` against a fresh node as a background task. The parent
    /// does not block here; the resolved child is merged when the parent
    /// finishes.
    pub fn spawn_child<F, Fut>(&self, description: impl Into<String>, body: F)
    where
        F: FnOnce(TestNode) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let child = TestNode::root(description);
        let handle = tokio::spawn(async move {
            body(child.clone()).await;
            child.finish().await
        });
        self.inner.lock().unwrap().pending.push(handle);
    }

    /// Merge an already-finalized child into this node.
    pub fn merge(&self, mut child: ResultNode) {
        let mut inner = self.inner.lock().unwrap();
        if inner.broken {
            child.invert_failures();
        }
        inner.children.push(child);
    }

    /// Finalize the node: resolve background children, apply broken
    /// semantics, snapshot, and attach to the parent. Idempotent — a
    /// second call returns the first snapshot.
    pub async fn finish(&self) -> ResultNode {
        if let Some(done) = self.inner.lock().unwrap().finished.clone() {
            return done;
        }

        let pending: Vec<JoinHandle<ResultNode>> = {
            let mut inner = self.inner.lock().unwrap();
            inner.pending.drain(..).collect()
        };
        let mut resolved = Vec::new();
        for handle in pending {
            match handle.await {
                Ok(node) => resolved.push(node),
                Err(e) => {
                    self.record_error("background test task", format!("task panicked: {e}"));
                }
            }
        }

        let (snapshot, parent) = {
            let mut inner = self.inner.lock().unwrap();
            for mut child in resolved {
                if inner.broken {
                    child.invert_failures();
                }
                inner.children.push(child);
            }

            let mut node = ResultNode {
                description: inner.description.clone(),
                started_at: inner.started_at,
                finished_at: Utc::now(),
                broken: inner.broken,
                assertions: inner.assertions.clone(),
                children: inner.children.clone(),
                logs: self.logs.lines(),
                error: inner.error.clone(),
            };

            // While broken, a terminal error is an expected failure like
            // any recorded error.
            if inner.broken {
                if let Some(message) = node.error.take() {
                    node.assertions.push(Assertion {
                        description: inner.description.clone(),
                        outcome: Outcome::Broken,
                        message: Some(message),
                    });
                }
            }

            // A known-broken node where nothing came out broken means
            // everything unexpectedly passed. Discard the results and
            // leave one loud error so the "fixed" test gets un-marked.
            if inner.broken && node.counts().broken == 0 {
                node.assertions.clear();
                node.children.clear();
                node.error = None;
                node.assertions.push(Assertion {
                    description: inner.description.clone(),
                    outcome: Outcome::Error,
                    message: Some(
                        "marked broken but recorded no failures; unexpectedly fixed".to_string(),
                    ),
                });
            }

            inner.finished = Some(node.clone());
            (node, inner.parent.clone())
        };

        if snapshot
            .logs
            .iter()
            .any(|line| line.contains(SUBMIT_RETRY_MARKER))
        {
            warn!(
                "'{}': transaction submission retries detected; infrastructure may be flaky",
                snapshot.description
            );
        }

        if let Some(parent) = parent {
            parent.merge(snapshot.clone());
        }
        snapshot
    }
}
