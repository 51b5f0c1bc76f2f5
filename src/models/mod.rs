//! Data model for the test harness
//!
//! Defines steps, problems, transaction requests/responses and engine state.

mod engine;
mod problem;
mod step;
mod transaction;

pub use engine::{EngineInfo, EngineState};
pub use problem::{ExpectedProblem, Problem, Severity, SeverityThreshold};
pub use step::Step;
pub use transaction::{TransactionRequest, TransactionResponse, TransactionState};
