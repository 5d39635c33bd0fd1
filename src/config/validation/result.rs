//! Validation results
//!
//! Issues are collected, never thrown. A result fails when it holds at least
//! one `Error` or `Critical` issue.

use std::fmt;

use serde::Serialize;

/// Issue severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Whether an issue of this severity fails validation
    pub fn is_blocking(&self) -> bool {
        matches!(self, Severity::Error | Severity::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A single finding about a configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Document path, e.g. `redis.port`
    pub path: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            severity,
        }
    }

    pub fn info(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(path, message, Severity::Info)
    }

    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(path, message, Severity::Warning)
    }

    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(path, message, Severity::Error)
    }

    pub fn critical(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(path, message, Severity::Critical)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.path, self.message)
    }
}

/// Ordered list of issues produced by one or more validators
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Result without any issue
    pub fn success() -> Self {
        Self::default()
    }

    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    /// True iff no issue is `Error` or `Critical`
    pub fn is_success(&self) -> bool {
        !self.issues.iter().any(|issue| issue.severity.is_blocking())
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.issues
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn info(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.push(ValidationIssue::info(path, message));
    }

    pub fn warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.push(ValidationIssue::warning(path, message));
    }

    pub fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.push(ValidationIssue::error(path, message));
    }

    pub fn critical(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.push(ValidationIssue::critical(path, message));
    }

    /// Append the issues of `other`, keeping encounter order
    pub fn combine(mut self, other: ValidationResult) -> Self {
        self.issues.extend(other.issues);
        self
    }

    /// Replace every occurrence of the given values in issue messages
    pub fn mask<'a>(mut self, values: impl IntoIterator<Item = &'a str>) -> Self {
        for value in values.into_iter().filter(|value| !value.is_empty()) {
            for issue in &mut self.issues {
                if issue.message.contains(value) {
                    issue.message = issue.message.replace(value, "***");
                }
            }
        }
        self
    }

    /// Issues of the given severity
    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |issue| issue.severity == severity)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.with_severity(severity).count()
    }

    pub fn has_severity(&self, severity: Severity) -> bool {
        self.count(severity) > 0
    }

    /// Issues reported on a path
    pub fn at(&self, path: &str) -> impl Iterator<Item = &ValidationIssue> + '_ {
        let path = path.to_string();
        self.issues.iter().filter(move |issue| issue.path == path)
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }
}

impl FromIterator<ValidationResult> for ValidationResult {
    fn from_iter<I: IntoIterator<Item = ValidationResult>>(iter: I) -> Self {
        iter.into_iter().fold(Self::success(), Self::combine)
    }
}
