//! Integration-test harness for a transactional query service
//!
//! The harness leases remote compute engines from a concurrency-bounded
//! pool, runs multi-step test cases inside ephemeral databases, drives
//! each submitted transaction to completion with retry and polling, and
//! aggregates the outcomes into a hierarchical result tree.
//!
//! Main pieces:
//!
//! - [`pool::EnginePool`] — lease manager over provisioned engines
//! - [`runner::TransactionRunner`] — submit, poll, collect one transaction
//! - [`orchestrator::TestOrchestrator`] — one test case end to end
//! - [`suite::SuiteRunner`] — parallel fan-out over many cases
//! - [`report::TestNode`] — live result recording with broken-test inversion

pub mod cli;
pub mod client;
pub mod config;
pub mod models;
pub mod orchestrator;
pub mod pool;
pub mod report;
pub mod runner;
pub mod suite;
pub mod utils;
