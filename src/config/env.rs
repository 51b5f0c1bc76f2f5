//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "TXQ_HARNESS";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Service base URL from TXQ_HARNESS_URL
    pub base_url: Option<String>,
    /// Bearer token from TXQ_HARNESS_TOKEN
    pub auth_token: Option<String>,
    /// Default transaction timeout (seconds) from TXQ_HARNESS_TIMEOUT
    pub timeout: Option<u64>,
    /// Tolerated unexpected-problem severity from TXQ_HARNESS_ALLOW_UNEXPECTED
    pub allow_unexpected: Option<String>,
    /// Base name for generated databases from TXQ_HARNESS_DATABASE_BASE
    pub database_base: Option<String>,
    /// Base name for pool engines from TXQ_HARNESS_ENGINE_BASE
    pub engine_base: Option<String>,
    /// Engine size class from TXQ_HARNESS_ENGINE_SIZE
    pub engine_size: Option<String>,
    /// Leases per engine from TXQ_HARNESS_CONCURRENCY
    pub concurrency: Option<usize>,
    /// Report directory from TXQ_HARNESS_REPORT_DIR
    pub report_dir: Option<String>,
    /// Verbose from TXQ_HARNESS_VERBOSE
    pub verbose: Option<bool>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            base_url: get_env("URL"),
            auth_token: get_env("TOKEN"),
            timeout: get_env_parse("TIMEOUT"),
            allow_unexpected: get_env("ALLOW_UNEXPECTED"),
            database_base: get_env("DATABASE_BASE"),
            engine_base: get_env("ENGINE_BASE"),
            engine_size: get_env("ENGINE_SIZE"),
            concurrency: get_env_parse("CONCURRENCY"),
            report_dir: get_env("REPORT_DIR"),
            verbose: get_env_bool("VERBOSE"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.base_url.is_some()
            || self.auth_token.is_some()
            || self.timeout.is_some()
            || self.allow_unexpected.is_some()
            || self.database_base.is_some()
            || self.engine_base.is_some()
            || self.engine_size.is_some()
            || self.concurrency.is_some()
            || self.report_dir.is_some()
            || self.verbose.is_some()
    }

    /// Get base URL with fallback
    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url.clone().unwrap_or_else(|| default.to_string())
    }

    /// Get timeout with fallback
    pub fn timeout_or(&self, default: u64) -> u64 {
        self.timeout.unwrap_or(default)
    }

    /// Get concurrency with fallback
    pub fn concurrency_or(&self, default: usize) -> usize {
        self.concurrency.unwrap_or(default)
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Builder for setting environment variables (useful for testing)
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    /// Create a new environment builder
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    /// Set service base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_URL"), url.into()));
        self
    }

    /// Set auth token
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_TOKEN"), token.into()));
        self
    }

    /// Set default transaction timeout
    pub fn timeout(mut self, timeout: u64) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_TIMEOUT"), timeout.to_string()));
        self
    }

    /// Set tolerated unexpected-problem severity
    pub fn allow_unexpected(mut self, threshold: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_ALLOW_UNEXPECTED"), threshold.into()));
        self
    }

    /// Set engine base name
    pub fn engine_base(mut self, base: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_ENGINE_BASE"), base.into()));
        self
    }

    /// Set engine size class
    pub fn engine_size(mut self, size: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_ENGINE_SIZE"), size.into()));
        self
    }

    /// Set leases per engine
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_CONCURRENCY"), concurrency.to_string()));
        self
    }

    /// Set report directory
    pub fn report_dir(mut self, dir: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_REPORT_DIR"), dir.into()));
        self
    }

    /// Set verbose
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_VERBOSE"), verbose.to_string()));
        self
    }

    /// Apply environment variables
    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(config.base_url.is_none());
        assert!(config.concurrency.is_none());
    }

    #[test]
    fn test_env_config_fallback() {
        let config = EnvConfig::default();
        assert_eq!(config.base_url_or("http://127.0.0.1:8010"), "http://127.0.0.1:8010");
        assert_eq!(config.timeout_or(300), 300);
        assert_eq!(config.concurrency_or(1), 1);
    }

    #[test]
    fn test_env_builder() {
        let _guard = EnvBuilder::new()
            .base_url("http://service:9000")
            .engine_size("XL")
            .timeout(60)
            .apply_scoped();

        let config = EnvConfig::load();
        assert_eq!(config.base_url, Some("http://service:9000".to_string()));
        assert_eq!(config.engine_size, Some("XL".to_string()));
        assert_eq!(config.timeout, Some(60));
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = EnvBuilder::new().verbose(true).apply_scoped();

        let config = EnvConfig::load();
        assert_eq!(config.verbose, Some(true));
    }

    #[test]
    fn test_has_any() {
        let empty = EnvConfig::default();
        assert!(!empty.has_any());

        let with_url = EnvConfig {
            base_url: Some("http://service:9000".to_string()),
            ..Default::default()
        };
        assert!(with_url.has_any());
    }
}
