//! Shared utilities

mod ids;
pub mod logger;

pub use ids::unique_id;
pub use logger::init_logger;
