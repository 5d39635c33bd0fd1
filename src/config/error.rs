//! Configuration errors
//!
//! This module defines error types for the configuration module.
//!
//! Data-shape problems are never errors here: they are reported as
//! [`ValidationIssue`]s. The types below cover environment failures
//! (files, secret stores) and the refusal to load or save an invalid document.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::validation::ValidationIssue;

/// A secret indirection token could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("secret '{identifier}' is not available from source '{secret_source}' (referenced by {field})")]
pub struct SecretUnavailable {
    /// Secret source named in the token (`env`, `cred`, ...)
    pub secret_source: String,

    /// Identifier looked up in that source
    pub identifier: String,

    /// Document path of the field holding the token
    pub field: String,
}

/// A string could not be parsed into one of the fixed value sets
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value '{value}' for {field}. Valid values are: {expected}")]
pub struct InvalidValue {
    /// Name of the field being parsed
    pub field: &'static str,

    /// Offending value
    pub value: String,

    /// Comma separated list of accepted values
    pub expected: String,
}

impl InvalidValue {
    pub(crate) fn new(field: &'static str, value: &str, expected: &[&str]) -> Self {
        Self {
            field,
            value: value.to_string(),
            expected: expected.join(", "),
        }
    }
}

/// Errors raised while loading a configuration document
#[derive(Debug, Error)]
pub enum LoadError {
    /// Configuration file does not exist
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Configuration file could not be read
    #[error("error reading configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document is not valid JSON or does not match the schema
    #[error("error parsing configuration from {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    /// Document declares a schema version this build does not know
    #[error("unsupported schema version '{found}' (supported: {supported})")]
    UnsupportedVersion { found: String, supported: String },

    /// A migration step could not transform the document
    #[error("schema migration failed: {0}")]
    Migration(String),

    /// A required secret could not be resolved
    #[error(transparent)]
    Secret(#[from] SecretUnavailable),

    /// An environment override could not be interpreted
    #[error("invalid environment variable {variable}: {reason}")]
    Environment { variable: String, reason: String },

    /// The document loaded but failed validation
    #[error("configuration is invalid:{}", format_issues(.0))]
    Invalid(Vec<ValidationIssue>),

    /// The document could not be converted to its tree form
    #[error("document conversion failed: {0}")]
    Document(#[from] serde_json::Error),

    /// The reload did not finish within the configured bound
    #[error("reading {} timed out after {timeout:?}", path.display())]
    Timeout { path: PathBuf, timeout: Duration },

    /// The background read task failed
    #[error("reload task failed: {0}")]
    Task(String),
}

impl LoadError {
    /// Validation issues carried by this error, if any
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            LoadError::Invalid(issues) => issues,
            _ => &[],
        }
    }
}

/// Errors raised while saving a configuration document
#[derive(Debug, Error)]
pub enum SaveError {
    /// Refused to write a configuration that fails validation
    #[error("refusing to save invalid configuration:{}", format_issues(.0))]
    Invalid(Vec<ValidationIssue>),

    /// Underlying file system failure
    #[error("error writing configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be serialized
    #[error("error serializing configuration: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl SaveError {
    /// Validation issues carried by this error, if any
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            SaveError::Invalid(issues) => issues,
            _ => &[],
        }
    }
}

/// Render an issue list as an indented bullet list
pub(crate) fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("\n  - {}", issue))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_lists_every_issue() {
        let err = LoadError::Invalid(vec![
            ValidationIssue::error("redis.port", "Port must be between 1 and 65535"),
            ValidationIssue::critical("redis.password", "Password is required"),
        ]);

        let message = err.to_string();
        assert!(message.contains("redis.port"));
        assert!(message.contains("redis.password"));
        assert_eq!(err.issues().len(), 2);
    }

    #[test]
    fn test_secret_unavailable_display() {
        let err = SecretUnavailable {
            secret_source: "env".to_string(),
            identifier: "REDIS_PASSWORD".to_string(),
            field: "redis.password".to_string(),
        };

        let message = err.to_string();
        assert!(message.contains("REDIS_PASSWORD"));
        assert!(message.contains("env"));
        assert!(message.contains("redis.password"));
    }

    #[test]
    fn test_save_error_issues() {
        let err = SaveError::Invalid(vec![ValidationIssue::error("service.name", "empty")]);
        assert_eq!(err.issues().len(), 1);

        let io = SaveError::Io {
            path: PathBuf::from("x.json"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        assert!(io.issues().is_empty());
    }
}
