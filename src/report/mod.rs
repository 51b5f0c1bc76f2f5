//! Result tree: recording, aggregation and storage

mod node;
mod storage;

pub use node::{Assertion, Counts, LogBuffer, Outcome, ResultNode, TestNode};
pub use storage::{ReportInfo, ReportStorage, StoredReport};
