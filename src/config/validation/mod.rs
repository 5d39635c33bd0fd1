//! Configuration validation
//!
//! This module provides the validators for each settings group and the
//! orchestrator that combines them into a single report.
//!
//! Validators are pure: they never mutate the configuration, never perform
//! I/O and report every problem they find instead of stopping at the first.

mod backend;
mod orchestrator;
mod redis;
mod result;
pub mod rules;
mod service;
mod system;

use crate::config::types::Configuration;

pub use backend::BackendValidator;
pub use orchestrator::{ConfigValidator, ProductionReadiness, ReadinessConcern, ValidationReport};
pub use redis::RedisValidator;
pub use result::{Severity, ValidationIssue, ValidationResult};
pub use service::ServiceValidator;
pub use system::SystemValidator;

/// A rule set over one part of the configuration
pub trait Validator: Send + Sync {
    /// Short name used in log output
    fn name(&self) -> &'static str;

    /// Check the configuration
    fn validate(&self, config: &Configuration) -> ValidationResult;
}
