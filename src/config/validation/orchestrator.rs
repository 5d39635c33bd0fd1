//! Validator orchestration
//!
//! Runs every validator against the same configuration in a fixed order,
//! then adds the checks that need more than one settings group. The
//! combined result keeps every issue, even after a validator has failed.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use uuid::Uuid;

use super::backend::NO_VOLUMES;
use super::rules::{self, PortMapping};
use super::{
    BackendValidator, RedisValidator, ServiceValidator, Severity, SystemValidator,
    ValidationResult, Validator,
};
use crate::config::defaults::ConfigDefaults;
use crate::config::types::{Configuration, RedisLogLevel, ServiceLogLevel};

/// Composes the validators and the cross-cutting rules
pub struct ConfigValidator {
    validators: Vec<Box<dyn Validator>>,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new(&ConfigDefaults::default())
    }
}

impl std::fmt::Debug for ConfigValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.validators.iter().map(|v| v.name()).collect();
        f.debug_struct("ConfigValidator").field("validators", &names).finish()
    }
}

impl ConfigValidator {
    /// Create the standard validator set
    pub fn new(defaults: &ConfigDefaults) -> Self {
        Self {
            validators: vec![
                Box::new(BackendValidator),
                Box::new(RedisValidator),
                Box::new(ServiceValidator),
                Box::new(SystemValidator::new(defaults.clock_skew_tolerance)),
            ],
        }
    }

    /// Run all validators and cross-cutting checks.
    ///
    /// Fields holding secret tokens are checked with their resolved values;
    /// those values are masked in every message.
    pub fn validate(&self, config: &Configuration) -> ValidationResult {
        let view = match config.resolved_view() {
            Ok(view) => Cow::Owned(view),
            Err(e) => {
                warn!("Validating unresolved fields: {}", e);
                Cow::Borrowed(config)
            }
        };
        let view = view.as_ref();

        let result: ValidationResult = self
            .validators
            .iter()
            .map(|validator| {
                let partial = validator.validate(view);
                debug!("Validator '{}' reported {} issue(s)", validator.name(), partial.len());
                partial
            })
            .collect();

        result
            .combine(container_checks(view))
            .combine(alignment_checks(view))
            .combine(security_checks(view))
            .combine(readiness_checks(view))
            .mask(config.resolved_values().iter().map(|(_, secret)| secret.expose()))
    }

    /// Validate and wrap the outcome in a report
    pub fn validate_with_report(&self, config: impl Into<Arc<Configuration>>) -> ValidationReport {
        self.report_with(config, ValidationResult::success())
    }

    /// Validate and report, adding issues found outside the validators
    pub fn report_with(
        &self,
        config: impl Into<Arc<Configuration>>,
        found: ValidationResult,
    ) -> ValidationReport {
        let config = config.into();
        let result = found.combine(self.validate(&config));
        ValidationReport::new(result, config)
    }
}

fn container_checks(config: &Configuration) -> ValidationResult {
    let mut result = ValidationResult::success();
    let Some(docker) = config.docker() else {
        return result;
    };

    // Same warning as the backend validator; both stay in the report
    if docker.volume_mappings.is_empty() {
        result.warning("backend.volumeMappings", NO_VOLUMES);
    }

    for (i, raw) in docker.port_mappings.iter().enumerate() {
        if let Ok(mapping) = PortMapping::parse(raw) {
            if i32::from(mapping.host) == config.redis.port {
                result.info(
                    format!("backend.portMappings[{i}]"),
                    format!(
                        "Host port {} is the same as redis.port; make sure no local Redis uses it",
                        mapping.host
                    ),
                );
            }
        }
    }

    result
}

fn alignment_checks(config: &Configuration) -> ValidationResult {
    let mut result = ValidationResult::success();
    let health = &config.monitoring.health_check;
    let restart = &config.performance.auto_restart;

    if !health.enabled {
        return result;
    }

    if !restart.enabled {
        result.info(
            "performance.autoRestart.enabled",
            "Health check failures will be detected but not remediated while auto restart is disabled",
        );
    } else if restart.cooldown_seconds > 0 && health.interval_seconds > 2 * restart.cooldown_seconds {
        result.info(
            "monitoring.healthCheck.intervalSeconds",
            "Health check interval is more than twice the restart cooldown",
        );
    }

    result
}

fn security_checks(config: &Configuration) -> ValidationResult {
    let mut result = ValidationResult::success();
    let redis = &config.redis;

    if !redis.require_password {
        result.warning(
            "redis.requirePassword",
            "Authentication is disabled; any client that can reach the port has full access",
        );
    }

    if rules::is_loopback_address(&redis.bind_address) {
        result.info("redis.bindAddress", "Redis only accepts connections from this machine");
    } else if rules::is_all_interfaces(&redis.bind_address) && !redis.require_password {
        result.warning(
            "redis.bindAddress",
            "Redis listens on all interfaces without authentication",
        );
    }

    if matches!(redis.log_level.parse::<RedisLogLevel>(), Ok(RedisLogLevel::Debug)) {
        result.warning("redis.logLevel", "Debug logging may expose sensitive data");
    }
    if matches!(
        config.monitoring.logging.level.parse::<ServiceLogLevel>(),
        Ok(ServiceLogLevel::Debug | ServiceLogLevel::Trace)
    ) {
        result.warning("monitoring.logging.level", "Debug logging may expose sensitive data");
    }

    result
}

fn readiness_checks(config: &Configuration) -> ValidationResult {
    let mut result = ValidationResult::success();
    for concern in ReadinessConcern::evaluate(config) {
        result.warning(concern.path(), format!("Not production ready: {}", concern.description()));
    }
    result
}

/// Named condition that keeps a configuration from being production ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadinessConcern {
    AuthenticationDisabled,
    PersistenceDisabled,
    DebugLogging,
}

impl ReadinessConcern {
    /// Concerns that apply to the configuration, in a fixed order
    pub fn evaluate(config: &Configuration) -> Vec<ReadinessConcern> {
        let mut concerns = Vec::new();
        if !config.redis.require_password {
            concerns.push(ReadinessConcern::AuthenticationDisabled);
        }
        if !config.redis.enable_persistence {
            concerns.push(ReadinessConcern::PersistenceDisabled);
        }
        if config.uses_debug_logging() {
            concerns.push(ReadinessConcern::DebugLogging);
        }
        concerns
    }

    /// Path the concern is reported on
    pub fn path(&self) -> &'static str {
        match self {
            ReadinessConcern::AuthenticationDisabled => "redis.requirePassword",
            ReadinessConcern::PersistenceDisabled => "redis.enablePersistence",
            ReadinessConcern::DebugLogging => "monitoring.logging.level",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ReadinessConcern::AuthenticationDisabled => "authentication is disabled",
            ReadinessConcern::PersistenceDisabled => "persistence is disabled",
            ReadinessConcern::DebugLogging => "debug logging is enabled",
        }
    }
}

/// Production readiness verdict with the concerns behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionReadiness {
    pub ready: bool,
    pub concerns: Vec<ReadinessConcern>,
}

/// Outcome of validating one configuration
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub id: Uuid,
    pub result: ValidationResult,
    /// The configuration that was validated
    pub config: Arc<Configuration>,
    pub timestamp: DateTime<Utc>,
    summary: String,
}

impl ValidationReport {
    fn new(result: ValidationResult, config: Arc<Configuration>) -> Self {
        let mut report = Self {
            id: Uuid::new_v4(),
            result,
            config,
            timestamp: Utc::now(),
            summary: String::new(),
        };
        report.summary = report.render();
        report
    }

    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }

    /// True iff validation succeeded without warnings or critical issues
    pub fn is_production_ready(&self) -> bool {
        self.result.is_success()
            && !self.result.has_severity(Severity::Warning)
            && !self.result.has_severity(Severity::Critical)
    }

    pub fn production_readiness(&self) -> ProductionReadiness {
        ProductionReadiness {
            ready: self.is_production_ready(),
            concerns: ReadinessConcern::evaluate(&self.config),
        }
    }

    /// Multi-line human readable summary. Never contains secret values.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    fn render(&self) -> String {
        let config = &self.config;
        let redis = &config.redis;
        let password = match redis.password.as_deref() {
            Some(_) => "<redacted>",
            None => "<none>",
        };

        let mut out = String::new();
        let _ = writeln!(out, "Validation report {}", self.id);
        let _ = writeln!(out, "Timestamp: {}", self.timestamp.to_rfc3339());
        let _ = writeln!(
            out,
            "Backend: {}, service '{}', Redis on {}:{}",
            config.kind(),
            config.service.name,
            redis.bind_address,
            redis.port
        );
        let _ = writeln!(
            out,
            "Authentication: {} (password: {})",
            if redis.require_password { "enabled" } else { "disabled" },
            password
        );
        let _ = writeln!(
            out,
            "Result: {} ({} critical, {} error(s), {} warning(s), {} info)",
            if self.is_success() { "passed" } else { "failed" },
            self.result.count(Severity::Critical),
            self.result.count(Severity::Error),
            self.result.count(Severity::Warning),
            self.result.count(Severity::Info),
        );
        let _ = writeln!(
            out,
            "Production ready: {}",
            if self.is_production_ready() { "yes" } else { "no" }
        );
        for issue in self.result.issues() {
            let _ = writeln!(out, "  - {}", issue);
        }
        out
    }
}
