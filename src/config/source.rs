//! Configuration sources
//!
//! This module defines the trait for layering configuration sources and the
//! default and environment variable implementations.
//!
//! Environment variables use the `REDIS_SERVICE_` prefix by default:
//!
//! | Variable suffix          | Field                                  |
//! |--------------------------|----------------------------------------|
//! | `BACKEND`                | `backend.type` (`wsl` or `docker`)     |
//! | `WSL_DISTRIBUTION`       | `backend.distribution`                 |
//! | `DOCKER_IMAGE`           | `backend.image`                        |
//! | `DOCKER_CONTAINER_NAME`  | `backend.containerName`                |
//! | `REDIS_PORT`             | `redis.port`                           |
//! | `REDIS_BIND_ADDRESS`     | `redis.bindAddress`                    |
//! | `REDIS_MAX_MEMORY`       | `redis.maxMemory`                      |
//! | `REDIS_MAX_MEMORY_POLICY`| `redis.maxMemoryPolicy`                |
//! | `REDIS_PERSISTENCE`      | `redis.persistenceMode`, `none` disables persistence |
//! | `REDIS_REQUIRE_PASSWORD` | `redis.requirePassword`                |
//! | `REDIS_PASSWORD`         | `redis.password` (kept as an `env` token) |
//! | `REDIS_LOG_LEVEL`        | `redis.logLevel`                       |
//! | `SERVICE_NAME`           | `service.name`                         |
//! | `SERVICE_DISPLAY_NAME`   | `service.displayName`                  |
//! | `SERVICE_START_TYPE`     | `service.startType`                    |
//! | `HEALTH_CHECK_ENABLED`   | `monitoring.healthCheck.enabled`       |
//! | `HEALTH_CHECK_INTERVAL`  | `monitoring.healthCheck.intervalSeconds` |
//! | `AUTO_RESTART_ENABLED`   | `performance.autoRestart.enabled`      |
//! | `LOG_LEVEL`              | `monitoring.logging.level`             |
//! | `LOG_FILE`               | `monitoring.logging.file.path`         |

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::{debug, warn};

use crate::config::defaults;
use crate::config::error::LoadError;
use crate::config::secrets::{ProcessEnvironment, Secret, SecretSource, ENV_SOURCE};
use crate::config::types::{BackendKind, BackendSettings, Configuration, PASSWORD_PATH};

/// A layer of configuration applied on top of a base configuration
pub trait ConfigSource: Send + Sync {
    /// Apply this source to `base`
    fn apply(&self, base: Configuration) -> Result<Configuration, LoadError>;

    /// Source name used in log output
    fn name(&self) -> &str;
}

/// Replaces the base with the defaults for a backend kind
#[derive(Debug, Clone, Copy)]
pub struct DefaultSource(pub BackendKind);

impl ConfigSource for DefaultSource {
    fn apply(&self, _base: Configuration) -> Result<Configuration, LoadError> {
        debug!("Loading default configuration for {} backend", self.0);
        Ok(defaults::configuration(self.0))
    }

    fn name(&self) -> &str {
        "defaults"
    }
}

/// Environment variable overrides
pub struct EnvSource {
    prefix: String,
    lookup: Arc<dyn SecretSource>,
}

impl fmt::Debug for EnvSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvSource").field("prefix", &self.prefix).finish_non_exhaustive()
    }
}

impl EnvSource {
    /// Read overrides from the process environment
    pub fn new(prefix: &str) -> Self {
        Self::with_lookup(prefix, Arc::new(ProcessEnvironment))
    }

    /// Read overrides through a custom lookup
    pub fn with_lookup(prefix: &str, lookup: Arc<dyn SecretSource>) -> Self {
        Self {
            prefix: prefix.to_string(),
            lookup,
        }
    }

    fn variable(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }

    fn get(&self, suffix: &str) -> Option<String> {
        let name = self.variable(suffix);
        let value = self.lookup.get(&name)?;
        let value = value.trim().to_string();
        if value.is_empty() {
            return None;
        }
        Some(value)
    }

    /// Look up a variable and log the override
    fn string(&self, suffix: &str) -> Option<String> {
        let value = self.get(suffix)?;
        debug!("Found environment variable {}={}", self.variable(suffix), value);
        Some(value)
    }

    fn parsed<T: FromStr>(&self, suffix: &str) -> Result<Option<T>, LoadError>
    where
        T::Err: fmt::Display,
    {
        match self.string(suffix) {
            Some(value) => value.parse::<T>().map(Some).map_err(|e| LoadError::Environment {
                variable: self.variable(suffix),
                reason: format!("'{}': {}", value, e),
            }),
            None => Ok(None),
        }
    }

    fn flag(&self, suffix: &str) -> Result<Option<bool>, LoadError> {
        match self.string(suffix) {
            Some(value) => parse_bool(&value).map(Some).ok_or_else(|| LoadError::Environment {
                variable: self.variable(suffix),
                reason: format!("'{}' is not a boolean", value),
            }),
            None => Ok(None),
        }
    }
}

/// Parse the usual spellings of a boolean flag
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl ConfigSource for EnvSource {
    fn apply(&self, mut config: Configuration) -> Result<Configuration, LoadError> {
        debug!("Loading configuration from environment variables with prefix: {}", self.prefix);

        // Backend
        if let Some(kind) = self.parsed::<BackendKind>("BACKEND")? {
            if kind != config.kind() {
                config.backend = defaults::backend(kind);
            }
        }

        let distribution = self.string("WSL_DISTRIBUTION");
        let image = self.string("DOCKER_IMAGE");
        let container = self.string("DOCKER_CONTAINER_NAME");
        match &mut config.backend {
            BackendSettings::Wsl(wsl) => {
                if let Some(distribution) = distribution {
                    wsl.distribution = distribution;
                }
                if image.is_some() || container.is_some() {
                    warn!("Ignoring Docker environment overrides for the WSL backend");
                }
            }
            BackendSettings::Docker(docker) => {
                if let Some(image) = image {
                    docker.image = image;
                }
                if let Some(container) = container {
                    docker.container_name = container;
                }
                if distribution.is_some() {
                    warn!("Ignoring WSL environment overrides for the Docker backend");
                }
            }
        }

        // Redis
        let redis = &mut config.redis;
        if let Some(port) = self.parsed::<i32>("REDIS_PORT")? {
            redis.port = port;
        }
        if let Some(address) = self.string("REDIS_BIND_ADDRESS") {
            redis.bind_address = address;
        }
        if let Some(memory) = self.string("REDIS_MAX_MEMORY") {
            redis.max_memory = memory;
        }
        if let Some(policy) = self.string("REDIS_MAX_MEMORY_POLICY") {
            redis.max_memory_policy = policy;
        }
        if let Some(mode) = self.string("REDIS_PERSISTENCE") {
            if mode.eq_ignore_ascii_case("none") {
                redis.enable_persistence = false;
                redis.persistence_mode = None;
            } else {
                redis.enable_persistence = true;
                redis.persistence_mode = Some(mode);
            }
        }
        if let Some(required) = self.flag("REDIS_REQUIRE_PASSWORD")? {
            redis.require_password = required;
        }
        // The value itself stays in the environment; only a reference is stored
        if let Some(password) = self.get("REDIS_PASSWORD") {
            debug!("Found environment variable {}", self.variable("REDIS_PASSWORD"));
            redis.password = Some(format!("${{{}:{}}}", ENV_SOURCE, self.variable("REDIS_PASSWORD")));
            config.set_resolved(PASSWORD_PATH, Secret::new(password));
        }
        let redis = &mut config.redis;
        if let Some(level) = self.string("REDIS_LOG_LEVEL") {
            redis.log_level = level;
        }

        // Service
        let service = &mut config.service;
        if let Some(name) = self.string("SERVICE_NAME") {
            service.name = name;
        }
        if let Some(name) = self.string("SERVICE_DISPLAY_NAME") {
            service.display_name = name;
        }
        if let Some(start_type) = self.string("SERVICE_START_TYPE") {
            service.start_type = start_type;
        }

        // Monitoring and performance
        if let Some(enabled) = self.flag("HEALTH_CHECK_ENABLED")? {
            config.monitoring.health_check.enabled = enabled;
        }
        if let Some(interval) = self.parsed::<i64>("HEALTH_CHECK_INTERVAL")? {
            config.monitoring.health_check.interval_seconds = interval;
        }
        if let Some(enabled) = self.flag("AUTO_RESTART_ENABLED")? {
            config.performance.auto_restart.enabled = enabled;
        }
        if let Some(level) = self.string("LOG_LEVEL") {
            config.monitoring.logging.level = level;
        }
        if let Some(path) = self.string("LOG_FILE") {
            config.monitoring.logging.file.enabled = true;
            config.monitoring.logging.file.path = path;
        }

        Ok(config)
    }

    fn name(&self) -> &str {
        "environment"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secrets::CredentialStore;

    fn source(vars: &[(&str, &str)]) -> EnvSource {
        let mut store = CredentialStore::new();
        for (name, value) in vars {
            store.insert(format!("TEST_{}", name), *value);
        }
        EnvSource::with_lookup("TEST_", Arc::new(store))
    }

    fn base() -> Configuration {
        defaults::configuration(BackendKind::Wsl)
    }

    #[test]
    fn test_overrides() {
        let config = source(&[
            ("REDIS_PORT", "6380"),
            ("REDIS_PERSISTENCE", "none"),
            ("SERVICE_NAME", "RedisCache"),
            ("HEALTH_CHECK_ENABLED", "off"),
            ("WSL_DISTRIBUTION", "Debian"),
        ])
        .apply(base())
        .unwrap();

        assert_eq!(config.redis.port, 6380);
        assert!(!config.redis.enable_persistence);
        assert_eq!(config.redis.persistence_mode, None);
        assert_eq!(config.service.name, "RedisCache");
        assert!(!config.monitoring.health_check.enabled);
        assert_eq!(config.wsl().unwrap().distribution, "Debian");
    }

    #[test]
    fn test_backend_switch() {
        let config = source(&[("BACKEND", "docker"), ("DOCKER_IMAGE", "redis:7.2")])
            .apply(base())
            .unwrap();

        assert_eq!(config.kind(), BackendKind::Docker);
        assert_eq!(config.docker().unwrap().image, "redis:7.2");
    }

    #[test]
    fn test_password_becomes_token() {
        let config = source(&[("REDIS_REQUIRE_PASSWORD", "true"), ("REDIS_PASSWORD", "Env-Secret-1")])
            .apply(base())
            .unwrap();

        assert!(config.redis.require_password);
        assert_eq!(config.redis.password.as_deref(), Some("${env:TEST_REDIS_PASSWORD}"));
    }

    #[test]
    fn test_password_is_trimmed_like_other_overrides() {
        let config = source(&[("REDIS_REQUIRE_PASSWORD", "true"), ("REDIS_PASSWORD", "  Env-Secret-1\n")])
            .apply(base())
            .unwrap();

        assert_eq!(config.password(), Some("Env-Secret-1"));
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let err = source(&[("REDIS_PORT", "high")]).apply(base()).unwrap_err();
        match err {
            LoadError::Environment { variable, .. } => assert_eq!(variable, "TEST_REDIS_PORT"),
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(source(&[("AUTO_RESTART_ENABLED", "maybe")]).apply(base()).is_err());
        assert!(source(&[("BACKEND", "hyperv")]).apply(base()).is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
