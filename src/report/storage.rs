//! Report storage and retrieval
//!
//! Persists finished result trees as timestamped JSON files so runs can
//! be inspected after the fact.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::node::ResultNode;
use crate::utils::unique_id;

/// A stored report: one finished root node plus identification
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredReport {
    /// Unique report id, doubles as the file stem
    pub id: String,

    /// When the report was written
    pub saved_at: DateTime<Utc>,

    /// Harness version that produced it
    pub tool_version: String,

    /// The finished result tree
    pub root: ResultNode,
}

impl StoredReport {
    pub fn new(root: ResultNode) -> Self {
        Self {
            id: unique_id("report"),
            saved_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            root,
        }
    }
}

/// Brief report information for listings
#[derive(Clone, Debug)]
pub struct ReportInfo {
    pub id: String,
    pub description: String,
    pub saved_at: DateTime<Utc>,
    pub passed: bool,
}

/// Report storage manager
pub struct ReportStorage {
    base_dir: PathBuf,
}

impl ReportStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn report_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("{id}.json"))
    }

    /// Save a finished result tree; returns the path written.
    pub fn save(&self, root: &ResultNode) -> Result<PathBuf> {
        fs::create_dir_all(&self.base_dir)?;

        let report = StoredReport::new(root.clone());
        let path = self.report_path(&report.id);
        let file = File::create(&path).context("Failed to create report file")?;
        let writer = BufWriter::new(file);

        serde_json::to_writer_pretty(writer, &report).context("Failed to write report")?;

        info!("Saved report to {}", path.display());
        Ok(path)
    }

    /// Load one report by id.
    pub fn load(&self, id: &str) -> Result<StoredReport> {
        let path = self.report_path(id);
        let file = File::open(&path).context("Failed to open report file")?;
        let reader = BufReader::new(file);

        let report: StoredReport =
            serde_json::from_reader(reader).context("Failed to parse report")?;

        debug!("Loaded report from {}", path.display());
        Ok(report)
    }

    pub fn load_from_path(&self, path: &Path) -> Result<StoredReport> {
        let file = File::open(path).context("Failed to open report file")?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).context("Failed to parse report")
    }

    /// List stored reports, newest first.
    pub fn list(&self) -> Result<Vec<ReportInfo>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut reports = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match self.load_from_path(&path) {
                    Ok(report) => reports.push(ReportInfo {
                        id: report.id,
                        description: report.root.description.clone(),
                        saved_at: report.saved_at,
                        passed: report.root.passed(),
                    }),
                    Err(e) => {
                        debug!("Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        reports.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(reports)
    }

    /// Latest stored report, if any.
    pub fn latest(&self) -> Result<Option<StoredReport>> {
        match self.list()?.first() {
            Some(info) => Ok(Some(self.load(&info.id)?)),
            None => Ok(None),
        }
    }

    /// Delete one report.
    pub fn delete(&self, id: &str) -> Result<()> {
        let path = self.report_path(id);
        if path.exists() {
            fs::remove_file(&path)?;
            info!("Deleted report: {}", path.display());
        }
        Ok(())
    }
}
