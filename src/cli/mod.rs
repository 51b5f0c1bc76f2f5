//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use serde::Deserialize;

use crate::models::Step;

/// Transaction test harness for the query service
#[derive(Parser, Debug)]
#[command(name = "txq-harness")]
#[command(version)]
#[command(about = "Run multi-step transaction tests against pooled query engines")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a suite of test cases from a file
    Run(RunArgs),

    /// Manage the engine pool
    Pool(PoolArgs),

    /// View stored reports
    Report(ReportArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to a JSON suite file
    #[arg(short, long)]
    pub file: String,

    /// Engines to provision for the run
    #[arg(short, long, default_value = "1")]
    pub engines: usize,

    /// Maximum concurrent test cases
    #[arg(short, long, default_value = "4")]
    pub concurrent: usize,

    /// Leave the engines provisioned after the run
    #[arg(long)]
    pub keep_engines: bool,

    /// Save the finished report to the report directory
    #[arg(short, long)]
    pub save: bool,
}

/// Arguments for pool management
#[derive(Parser, Debug)]
pub struct PoolArgs {
    #[command(subcommand)]
    pub action: PoolAction,
}

#[derive(Subcommand, Debug)]
pub enum PoolAction {
    /// Provision engines up to the given pool size
    Provision {
        /// Target number of engines
        #[arg(short, long)]
        size: usize,

        /// Base name for generated engine names
        #[arg(short, long)]
        base: Option<String>,

        /// Append a random suffix to generated names
        #[arg(short, long)]
        random: bool,
    },

    /// Delete sequentially named engines
    Destroy {
        /// Number of engines to delete
        #[arg(short, long)]
        size: usize,

        /// Base name the engines were created with
        #[arg(short, long)]
        base: Option<String>,
    },
}

/// Arguments for report viewing
#[derive(Parser, Debug)]
pub struct ReportArgs {
    #[command(subcommand)]
    pub action: ReportAction,
}

#[derive(Subcommand, Debug)]
pub enum ReportAction {
    /// List stored reports, newest first
    List,

    /// Print one report as a tree
    Show {
        /// Report id, defaults to the latest
        #[arg(short, long)]
        id: Option<String>,
    },

    /// Delete one stored report
    Delete {
        /// Report id
        #[arg(short, long)]
        id: String,
    },
}

/// On-disk suite description consumed by the run command
#[derive(Debug, Deserialize)]
pub struct SuiteFile {
    #[serde(default)]
    pub description: Option<String>,

    pub cases: Vec<SuiteCase>,
}

/// One test case in a suite file
#[derive(Debug, Deserialize)]
pub struct SuiteCase {
    pub name: String,

    #[serde(default)]
    pub steps: Vec<Step>,

    /// Pin the case to a named engine instead of leasing one
    #[serde(default)]
    pub engine: Option<String>,

    /// Clone the case's database from a template
    #[serde(default)]
    pub clone_source: Option<String>,

    /// The whole case is expected to fail
    #[serde(default)]
    pub broken: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suite_file_parsing() {
        let raw = r#"{
            "description": "smoke",
            "cases": [
                {
                    "name": "basic",
                    "steps": [{"query": "def output = 1", "expected": {"output": [1]}}]
                },
                {"name": "known broken", "broken": true}
            ]
        }"#;

        let suite: SuiteFile = serde_json::from_str(raw).unwrap();
        assert_eq!(suite.description.as_deref(), Some("smoke"));
        assert_eq!(suite.cases.len(), 2);
        assert_eq!(suite.cases[0].steps.len(), 1);
        assert!(suite.cases[1].broken);
        assert!(suite.cases[1].steps.is_empty());
    }
}
