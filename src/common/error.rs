//! Error handling module
//!
//! This module defines the top level error type and result alias used by
//! callers that drive the configuration subsystem as a whole.

use std::io;

use thiserror::Error;

use crate::config::{LoadError, SaveError};

/// Redis service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Loading a configuration failed
    #[error("Configuration load error: {0}")]
    Load(#[from] LoadError),

    /// Saving a configuration failed
    #[error("Configuration save error: {0}")]
    Save(#[from] SaveError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// File watcher error
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ServiceError`.
pub type Result<T> = std::result::Result<T, ServiceError>;
