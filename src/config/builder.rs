//! Configuration builder
//!
//! This module provides a builder pattern for constructing configuration
//! programmatically.

use std::sync::Arc;

use log::debug;

use crate::config::defaults::{self, ENV_PREFIX};
use crate::config::error::LoadError;
use crate::config::source::{ConfigSource, EnvSource};
use crate::config::types::{
    BackendKind, BackendSettings, Configuration, RecoveryAction, PASSWORD_PATH,
};
use crate::config::validation::ConfigValidator;

/// Configuration builder
///
/// Starts from the defaults of a backend kind (or an existing configuration),
/// applies sources and explicit settings, and validates the result unless
/// validation is disabled.
pub struct ConfigBuilder {
    config: Configuration,
    sources: Vec<Box<dyn ConfigSource>>,
    validator: Option<Arc<ConfigValidator>>,
    validate: bool,
}

impl ConfigBuilder {
    /// Create a builder starting from the defaults for `kind`
    pub fn new(kind: BackendKind) -> Self {
        Self::from_config(defaults::configuration(kind))
    }

    /// Create a builder starting from an existing configuration
    pub fn from_config(config: Configuration) -> Self {
        Self {
            config,
            sources: Vec::new(),
            validator: None,
            validate: true,
        }
    }

    /// Add a source. Sources are applied in order when building and
    /// override the builder's own settings.
    pub fn with_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        debug!("Adding configuration source: {}", source.name());
        self.sources.push(source);
        self
    }

    /// Add environment variable overrides
    pub fn with_env(self, prefix: &str) -> Self {
        self.with_source(Box::new(EnvSource::new(prefix)))
    }

    /// Use a specific validator
    pub fn with_validator(mut self, validator: Arc<ConfigValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Disable validation
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    pub fn backend(mut self, backend: BackendSettings) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn port(mut self, port: i32) -> Self {
        self.config.redis.port = port;
        self
    }

    pub fn bind_address(mut self, address: impl Into<String>) -> Self {
        self.config.redis.bind_address = address.into();
        self
    }

    /// Memory limit and eviction policy
    pub fn max_memory(mut self, limit: impl Into<String>, policy: impl Into<String>) -> Self {
        self.config.redis.max_memory = limit.into();
        self.config.redis.max_memory_policy = policy.into();
        self
    }

    /// Enable persistence with the given mode, or disable it with `None`
    pub fn persistence(mut self, mode: Option<&str>) -> Self {
        self.config.redis.enable_persistence = mode.is_some();
        self.config.redis.persistence_mode = mode.map(str::to_string);
        self
    }

    /// Require authentication with a literal password or a secret token
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.redis.require_password = true;
        self.config.redis.password = Some(password.into());
        self.config.forget_resolved(PASSWORD_PATH);
        self
    }

    /// Disable authentication
    pub fn no_password(mut self) -> Self {
        self.config.redis.require_password = false;
        self.config.redis.password = None;
        self.config.forget_resolved(PASSWORD_PATH);
        self
    }

    pub fn redis_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.redis.log_level = level.into();
        self
    }

    /// Service name and display name
    pub fn service_name(mut self, name: impl Into<String>, display_name: impl Into<String>) -> Self {
        self.config.service.name = name.into();
        self.config.service.display_name = display_name.into();
        self
    }

    pub fn start_type(mut self, start_type: impl Into<String>) -> Self {
        self.config.service.start_type = start_type.into();
        self
    }

    pub fn recovery_actions(mut self, actions: Vec<RecoveryAction>) -> Self {
        self.config.service.recovery.actions = actions;
        self
    }

    pub fn health_check(mut self, enabled: bool, interval_seconds: i64, timeout_seconds: i64) -> Self {
        let health = &mut self.config.monitoring.health_check;
        health.enabled = enabled;
        health.interval_seconds = interval_seconds;
        health.timeout_seconds = timeout_seconds;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.monitoring.logging.level = level.into();
        self
    }

    pub fn auto_restart(mut self, enabled: bool, max_attempts: i64, cooldown_seconds: i64) -> Self {
        let restart = &mut self.config.performance.auto_restart;
        restart.enabled = enabled;
        restart.max_attempts = max_attempts;
        restart.cooldown_seconds = cooldown_seconds;
        self
    }

    pub fn memory_thresholds(mut self, warning: i64, error: i64) -> Self {
        self.config.performance.memory_warning_threshold = warning;
        self.config.performance.memory_error_threshold = error;
        self
    }

    pub fn custom_arg(mut self, arg: impl Into<String>) -> Self {
        self.config.advanced.custom_args.push(arg.into());
        self
    }

    pub fn environment_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.advanced.environment.insert(key.into(), value.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.config.metadata.author = author.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Configuration, LoadError> {
        let ConfigBuilder {
            mut config,
            sources,
            validator,
            validate,
        } = self;

        debug!("Building configuration from {} sources", sources.len());

        for source in &sources {
            debug!("Applying configuration source: {}", source.name());
            config = source.apply(config)?;
        }

        if validate {
            debug!("Validating configuration");
            let validator = validator.unwrap_or_default();
            let result = validator.validate(&config);
            if !result.is_success() {
                return Err(LoadError::Invalid(result.into_issues()));
            }
        }

        Ok(config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new(BackendKind::Wsl).with_env(ENV_PREFIX)
    }
}
