//! Problems reported by the query service
//!
//! A problem is a per-step diagnostic (compiler warning, integrity
//! violation, runtime exception) attached to a transaction. Expected
//! problems are matched by code, optionally narrowed by line and severity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a reported problem
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Exception,
}

impl Severity {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "warning" | "warn" => Some(Severity::Warning),
            "error" => Some(Severity::Error),
            "exception" => Some(Severity::Exception),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Exception => write!(f, "exception"),
        }
    }
}

/// Threshold below which unexpected problems are tolerated
///
/// Ordering: `None < Warning < Error`. Exceptions are never tolerated,
/// whatever the threshold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityThreshold {
    #[default]
    None,
    Warning,
    Error,
}

impl SeverityThreshold {
    /// Whether an unexpected problem of the given severity is tolerated.
    pub fn allows(&self, severity: Severity) -> bool {
        match (self, severity) {
            (_, Severity::Exception) => false,
            (SeverityThreshold::None, _) => false,
            (SeverityThreshold::Warning, Severity::Warning) => true,
            (SeverityThreshold::Warning, _) => false,
            (SeverityThreshold::Error, _) => true,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(SeverityThreshold::None),
            "warning" | "warn" => Some(SeverityThreshold::Warning),
            "error" => Some(SeverityThreshold::Error),
            _ => None,
        }
    }
}

/// A problem reported by the service for one transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Problem code, e.g. "PARSE_ERROR"
    pub code: String,

    /// Severity, if the service reported one
    #[serde(default)]
    pub severity: Option<Severity>,

    /// Source line the problem points at
    #[serde(default)]
    pub line: Option<u32>,

    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
}

impl Problem {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            severity: None,
            line: None,
            message: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Effective severity used for threshold checks. Problems without a
    /// reported severity are treated as errors.
    pub fn effective_severity(&self) -> Severity {
        self.severity.unwrap_or(Severity::Error)
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(sev) = self.severity {
            write!(f, " [{sev}]")?;
        }
        if let Some(line) = self.line {
            write!(f, " @ line {line}")?;
        }
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

/// An expected problem declared on a step
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedProblem {
    /// Problem code that must appear
    pub code: String,

    /// If set, the reported line must match
    #[serde(default)]
    pub line: Option<u32>,

    /// If set, the reported severity must match
    #[serde(default)]
    pub severity: Option<Severity>,
}

impl ExpectedProblem {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            line: None,
            severity: None,
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Match against a reported problem: code always, line and severity
    /// only when declared.
    pub fn matches(&self, problem: &Problem) -> bool {
        if self.code != problem.code {
            return false;
        }
        if let Some(line) = self.line {
            if problem.line != Some(line) {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if problem.severity != Some(severity) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_ordering() {
        assert!(!SeverityThreshold::None.allows(Severity::Warning));
        assert!(SeverityThreshold::Warning.allows(Severity::Warning));
        assert!(!SeverityThreshold::Warning.allows(Severity::Error));
        assert!(SeverityThreshold::Error.allows(Severity::Error));
        assert!(SeverityThreshold::Error.allows(Severity::Warning));
    }

    #[test]
    fn test_exceptions_never_allowed() {
        assert!(!SeverityThreshold::None.allows(Severity::Exception));
        assert!(!SeverityThreshold::Warning.allows(Severity::Exception));
        assert!(!SeverityThreshold::Error.allows(Severity::Exception));
    }

    #[test]
    fn test_expected_problem_match_by_code() {
        let expected = ExpectedProblem::new("PARSE_ERROR");
        let problem = Problem::new("PARSE_ERROR")
            .with_severity(Severity::Error)
            .with_line(12);
        assert!(expected.matches(&problem));
        assert!(!expected.matches(&Problem::new("TYPE_ERROR")));
    }

    #[test]
    fn test_expected_problem_narrowed_by_line_and_severity() {
        let expected = ExpectedProblem::new("PARSE_ERROR")
            .at_line(12)
            .with_severity(Severity::Error);

        let at_wrong_line = Problem::new("PARSE_ERROR")
            .with_severity(Severity::Error)
            .with_line(13);
        assert!(!expected.matches(&at_wrong_line));

        let wrong_severity = Problem::new("PARSE_ERROR")
            .with_severity(Severity::Warning)
            .with_line(12);
        assert!(!expected.matches(&wrong_severity));

        let exact = Problem::new("PARSE_ERROR")
            .with_severity(Severity::Error)
            .with_line(12);
        assert!(expected.matches(&exact));
    }

    #[test]
    fn test_missing_severity_treated_as_error() {
        let problem = Problem::new("UNKNOWN");
        assert_eq!(problem.effective_severity(), Severity::Error);
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!(Severity::from_str("warning"), Some(Severity::Warning));
        assert_eq!(Severity::from_str("EXCEPTION"), Some(Severity::Exception));
        assert_eq!(Severity::from_str("bogus"), None);
        assert_eq!(
            SeverityThreshold::from_str("error"),
            Some(SeverityThreshold::Error)
        );
    }
}
