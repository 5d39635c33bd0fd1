//! Default configuration values
//!
//! This module provides default values for configuration options.
//! It is the single source of truth for defaults, so that `CreateDefault`,
//! the builder and the environment source always agree with each other.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;

use crate::config::migration::CURRENT_SCHEMA_VERSION;
use crate::config::types::{
    AdvancedSettings, AutoRestartSettings, BackendKind, BackendSettings, Configuration,
    DockerSettings, FileLogSettings, HealthCheckSettings, LifecycleHooks, LoggingSettings,
    Metadata, MonitoringSettings, PerformanceSettings, RecoveryAction, RecoverySettings,
    RedisSettings, ResourceLimits, ServiceSettings, SlowLogSettings, WslSettings,
};

/// Environment variable prefix for all configuration overrides
pub const ENV_PREFIX: &str = "REDIS_SERVICE_";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "redis-service.json";

/// Default Redis port
pub const REDIS_PORT: i32 = 6379;

/// Default bind address
pub const BIND_ADDRESS: &str = "127.0.0.1";

/// Default memory limit
pub const MAX_MEMORY: &str = "256mb";

/// Default eviction policy
pub const MAX_MEMORY_POLICY: &str = "allkeys-lru";

/// Default persistence mode
pub const PERSISTENCE_MODE: &str = "rdb";

/// Default Redis log verbosity
pub const REDIS_LOG_LEVEL: &str = "notice";

/// Default Windows service name
pub const SERVICE_NAME: &str = "Redis";

/// Default Windows service display name
pub const SERVICE_DISPLAY_NAME: &str = "Redis Server";

/// Default service start type
pub const START_TYPE: &str = "Automatic";

/// Default WSL distribution
pub const WSL_DISTRIBUTION: &str = "Ubuntu";

/// Default Docker image
pub const DOCKER_IMAGE: &str = "redis:7-alpine";

/// Default Docker container name
pub const DOCKER_CONTAINER_NAME: &str = "redis-service";

/// Default service log file
pub const LOG_FILE_PATH: &str = "C:\\ProgramData\\RedisService\\logs\\service.log";

/// Default service log level
pub const SERVICE_LOG_LEVEL: &str = "information";

/// Default configuration document version (not the schema version)
pub const CONFIG_VERSION: &str = "1.0.0";

/// Default author recorded in metadata
pub const AUTHOR: &str = "redis-service";

/// Settings that tune the configuration subsystem itself.
///
/// Passed explicitly to the components that need it instead of living in
/// global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDefaults {
    /// Upper bound for the I/O part of a reload
    pub reload_timeout: Duration,

    /// How far in the future metadata timestamps may lie before they are rejected
    pub clock_skew_tolerance: Duration,

    /// Prefix of the environment variables read by `FromEnvironment`
    pub env_prefix: String,

    /// File name used when no explicit path is given
    pub config_file: String,

    /// Capacity of the change event channel
    pub event_capacity: usize,
}

impl Default for ConfigDefaults {
    fn default() -> Self {
        Self {
            reload_timeout: Duration::from_secs(5),
            clock_skew_tolerance: Duration::ZERO,
            env_prefix: ENV_PREFIX.to_string(),
            config_file: DEFAULT_CONFIG_FILE.to_string(),
            event_capacity: 64,
        }
    }
}

impl ConfigDefaults {
    /// Override the reload timeout
    pub fn with_reload_timeout(mut self, timeout: Duration) -> Self {
        self.reload_timeout = timeout;
        self
    }

    /// Override the clock skew tolerance applied to metadata timestamps
    pub fn with_clock_skew_tolerance(mut self, tolerance: Duration) -> Self {
        self.clock_skew_tolerance = tolerance;
        self
    }

    /// Override the environment variable prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }
}

/// Default backend settings for the given kind
pub fn backend(kind: BackendKind) -> BackendSettings {
    match kind {
        BackendKind::Wsl => BackendSettings::Wsl(WslSettings::default()),
        BackendKind::Docker => BackendSettings::Docker(DockerSettings::default()),
    }
}

/// Complete default configuration for the given backend kind
pub fn configuration(kind: BackendKind) -> Configuration {
    Configuration::new(
        CURRENT_SCHEMA_VERSION.to_string(),
        backend(kind),
        RedisSettings::default(),
        ServiceSettings::default(),
        MonitoringSettings::default(),
        PerformanceSettings::default(),
        AdvancedSettings::default(),
        Metadata::default(),
    )
}

impl Default for WslSettings {
    fn default() -> Self {
        Self {
            distribution: WSL_DISTRIBUTION.to_string(),
            redis_path: "/usr/bin/redis-server".to_string(),
            config_path: "/etc/redis/redis.conf".to_string(),
            windows_data_path: "C:\\ProgramData\\Redis\\data".to_string(),
            linux_data_path: "/var/lib/redis".to_string(),
        }
    }
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            image: DOCKER_IMAGE.to_string(),
            container_name: DOCKER_CONTAINER_NAME.to_string(),
            port_mappings: vec![format!("{REDIS_PORT}:{REDIS_PORT}")],
            volume_mappings: vec!["redis-data:/data".to_string()],
            resources: ResourceLimits::default(),
        }
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_limit: Some("512m".to_string()),
            cpu_limit: Some(1.0),
        }
    }
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            port: REDIS_PORT,
            bind_address: BIND_ADDRESS.to_string(),
            max_memory: MAX_MEMORY.to_string(),
            max_memory_policy: MAX_MEMORY_POLICY.to_string(),
            enable_persistence: true,
            persistence_mode: Some(PERSISTENCE_MODE.to_string()),
            require_password: false,
            password: None,
            log_level: REDIS_LOG_LEVEL.to_string(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: SERVICE_NAME.to_string(),
            display_name: SERVICE_DISPLAY_NAME.to_string(),
            description: "Redis data store hosted as a Windows service".to_string(),
            start_type: START_TYPE.to_string(),
            recovery: RecoverySettings::default(),
        }
    }
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            reset_period_seconds: 86_400,
            actions: vec![
                RecoveryAction::new("restart", 60),
                RecoveryAction::new("restart", 120),
                RecoveryAction::new("none", 0),
            ],
        }
    }
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            health_check: HealthCheckSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 30,
            timeout_seconds: 5,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: SERVICE_LOG_LEVEL.to_string(),
            console: false,
            event_log: true,
            file: FileLogSettings::default(),
        }
    }
}

impl Default for FileLogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: LOG_FILE_PATH.to_string(),
            max_size_mb: 10,
            max_files: 5,
        }
    }
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            auto_restart: AutoRestartSettings::default(),
            memory_warning_threshold: 80,
            memory_error_threshold: 95,
            slow_log: SlowLogSettings::default(),
        }
    }
}

impl Default for AutoRestartSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            cooldown_seconds: 60,
        }
    }
}

impl Default for SlowLogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_ms: 1000,
        }
    }
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            custom_args: Vec::new(),
            environment: BTreeMap::new(),
            hooks: LifecycleHooks::default(),
        }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            config_version: CONFIG_VERSION.to_string(),
            author: AUTHOR.to_string(),
            description: None,
            created: now,
            modified: now,
        }
    }
}
