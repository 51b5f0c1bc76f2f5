//! Harness configuration
//!
//! One flat configuration struct with sensible defaults, overridable
//! from `TXQ_HARNESS_*` environment variables, feeding the per-component
//! configs (pool, runner, orchestrator, HTTP client).

use std::path::PathBuf;
use std::time::Duration;

use crate::client::ServiceConfig;
use crate::models::SeverityThreshold;
use crate::orchestrator::OrchestratorConfig;
use crate::pool::PoolConfig;
use crate::runner::RunnerConfig;

mod env;

pub use env::{EnvBuilder, EnvConfig, EnvGuard};

/// Top-level harness configuration
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    /// Query service base URL
    pub base_url: String,

    /// Bearer token for the service, if required
    pub auth_token: Option<String>,

    /// Default transaction timeout in seconds
    pub default_timeout_secs: u64,

    /// Default tolerance for unexpected problems
    pub allow_unexpected: SeverityThreshold,

    /// Base name for generated ephemeral databases
    pub database_base: String,

    /// Base name for pool engine names
    pub engine_base: String,

    /// Size class passed to the provisioning API
    pub engine_size: String,

    /// Simultaneous leases allowed per engine
    pub engine_concurrency: usize,

    /// Directory where finished reports are stored
    pub report_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8010".to_string(),
            auth_token: None,
            default_timeout_secs: 300,
            allow_unexpected: SeverityThreshold::None,
            database_base: "txq-db".to_string(),
            engine_base: "txq-engine".to_string(),
            engine_size: "S".to_string(),
            engine_concurrency: 1,
            report_dir: PathBuf::from("reports"),
        }
    }
}

impl HarnessConfig {
    /// Defaults overlaid with any TXQ_HARNESS_* environment variables.
    pub fn from_env() -> Self {
        let env = EnvConfig::load();
        let defaults = Self::default();

        // Helper lookups first; the remaining fields move out of `env`.
        let base_url = env.base_url_or(&defaults.base_url);
        let default_timeout_secs = env.timeout_or(defaults.default_timeout_secs);
        let engine_concurrency = env.concurrency_or(defaults.engine_concurrency);

        Self {
            base_url,
            auth_token: env.auth_token,
            default_timeout_secs,
            allow_unexpected: env
                .allow_unexpected
                .as_deref()
                .and_then(SeverityThreshold::from_str)
                .unwrap_or(defaults.allow_unexpected),
            database_base: env.database_base.unwrap_or(defaults.database_base),
            engine_base: env.engine_base.unwrap_or(defaults.engine_base),
            engine_size: env.engine_size.unwrap_or(defaults.engine_size),
            engine_concurrency,
            report_dir: env
                .report_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.report_dir),
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            concurrency: self.engine_concurrency,
            engine_size: self.engine_size.clone(),
            ..PoolConfig::default()
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig::default()
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            default_timeout: Duration::from_secs(self.default_timeout_secs),
            database_base: self.database_base.clone(),
        }
    }

    pub fn service_config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::new(&self.base_url);
        if let Some(token) = &self.auth_token {
            config = config.auth_token(token);
        }
        config
    }
}
