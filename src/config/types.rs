//! Configuration types
//!
//! This module contains the configuration model shared by the loader,
//! the validators and the change analyzer.
//!
//! Enum-like settings are stored as plain strings so that a malformed value
//! surfaces as a validation issue instead of a parse failure. The typed enums
//! below are what the validators parse those strings into.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::document;
use crate::config::error::InvalidValue;
use crate::config::secrets::{ResolvedValues, Secret};

/// Document path of the authentication secret
pub const PASSWORD_PATH: &str = "redis.password";

/// Define a closed set of string values with `Display` and a
/// case-insensitive `FromStr`.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($field:literal) {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every accepted spelling, in declaration order
            pub const VARIANTS: &'static [&'static str] = &[$($text),+];

            /// Canonical spelling
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = InvalidValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $(
                    if s.eq_ignore_ascii_case($text) {
                        return Ok($name::$variant);
                    }
                )+
                Err(InvalidValue::new($field, s, Self::VARIANTS))
            }
        }
    };
}

string_enum! {
    /// Redis eviction policy applied once `maxmemory` is reached
    EvictionPolicy("maxMemoryPolicy") {
        NoEviction => "noeviction",
        AllKeysLru => "allkeys-lru",
        AllKeysLfu => "allkeys-lfu",
        AllKeysRandom => "allkeys-random",
        VolatileLru => "volatile-lru",
        VolatileLfu => "volatile-lfu",
        VolatileRandom => "volatile-random",
        VolatileTtl => "volatile-ttl",
    }
}

string_enum! {
    /// Redis persistence strategy
    PersistenceMode("persistenceMode") {
        Rdb => "rdb",
        Aof => "aof",
        Both => "both",
    }
}

string_enum! {
    /// Redis server log verbosity
    RedisLogLevel("logLevel") {
        Debug => "debug",
        Verbose => "verbose",
        Notice => "notice",
        Warning => "warning",
    }
}

string_enum! {
    /// Windows service start policy
    StartType("startType") {
        Automatic => "Automatic",
        Manual => "Manual",
        Disabled => "Disabled",
    }
}

string_enum! {
    /// Action taken by the service control manager after a failure
    RecoveryActionType("type") {
        Restart => "restart",
        Reboot => "reboot",
        RunCommand => "runCommand",
        None => "none",
    }
}

string_enum! {
    /// Log level of the hosting service itself
    ServiceLogLevel("level") {
        Trace => "trace",
        Debug => "debug",
        Information => "information",
        Warning => "warning",
        Error => "error",
        Critical => "critical",
    }
}

/// Execution environment hosting the Redis process
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Redis running inside a WSL distribution
    Wsl,
    /// Redis running in a Docker container
    Docker,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Wsl => write!(f, "wsl"),
            BackendKind::Docker => write!(f, "docker"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wsl" => Ok(Self::Wsl),
            "docker" => Ok(Self::Docker),
            _ => Err(InvalidValue::new("backend.type", s, &["wsl", "docker"])),
        }
    }
}

/// Backend specific settings.
///
/// Only the payload of the active backend can exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendSettings {
    Wsl(WslSettings),
    Docker(DockerSettings),
}

impl BackendSettings {
    /// Kind of the active backend
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendSettings::Wsl(_) => BackendKind::Wsl,
            BackendSettings::Docker(_) => BackendKind::Docker,
        }
    }
}

/// WSL distribution and the paths Redis uses inside and outside of it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WslSettings {
    pub distribution: String,
    pub redis_path: String,
    pub config_path: String,
    pub windows_data_path: String,
    pub linux_data_path: String,
}

/// Docker container settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DockerSettings {
    pub image: String,
    pub container_name: String,
    /// `host:container[/proto]` entries
    pub port_mappings: Vec<String>,
    /// `source:target[:mode]` entries
    pub volume_mappings: Vec<String>,
    pub resources: ResourceLimits,
}

/// Container resource limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceLimits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<f64>,
}

/// Settings passed to the Redis server
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedisSettings {
    pub port: i32,
    pub bind_address: String,
    pub max_memory: String,
    pub max_memory_policy: String,
    pub enable_persistence: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_mode: Option<String>,
    pub require_password: bool,
    /// Literal password or a `${source:name}` token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub log_level: String,
}

// Literal passwords are redacted, tokens are shown as written.
impl fmt::Debug for RedisSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = self.password.as_deref().map(|raw| {
            if crate::config::secrets::contains_token(raw) {
                raw
            } else {
                "***"
            }
        });

        f.debug_struct("RedisSettings")
            .field("port", &self.port)
            .field("bind_address", &self.bind_address)
            .field("max_memory", &self.max_memory)
            .field("max_memory_policy", &self.max_memory_policy)
            .field("enable_persistence", &self.enable_persistence)
            .field("persistence_mode", &self.persistence_mode)
            .field("require_password", &self.require_password)
            .field("password", &password)
            .field("log_level", &self.log_level)
            .finish()
    }
}

/// Windows service registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceSettings {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub start_type: String,
    pub recovery: RecoverySettings,
}

/// Failure recovery policy of the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecoverySettings {
    pub reset_period_seconds: i64,
    pub actions: Vec<RecoveryAction>,
}

/// One entry of the recovery action list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub delay_seconds: i64,
}

impl RecoveryAction {
    pub fn new(action_type: &str, delay_seconds: i64) -> Self {
        Self {
            action_type: action_type.to_string(),
            delay_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitoringSettings {
    pub health_check: HealthCheckSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthCheckSettings {
    pub enabled: bool,
    pub interval_seconds: i64,
    pub timeout_seconds: i64,
}

/// Logging sinks of the hosting service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub console: bool,
    pub event_log: bool,
    pub file: FileLogSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileLogSettings {
    pub enabled: bool,
    pub path: String,
    pub max_size_mb: i64,
    pub max_files: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceSettings {
    pub auto_restart: AutoRestartSettings,
    /// Percentage of `maxMemory`
    pub memory_warning_threshold: i64,
    /// Percentage of `maxMemory`
    pub memory_error_threshold: i64,
    pub slow_log: SlowLogSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoRestartSettings {
    pub enabled: bool,
    pub max_attempts: i64,
    pub cooldown_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlowLogSettings {
    pub enabled: bool,
    pub threshold_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvancedSettings {
    /// Extra arguments appended to the Redis command line
    pub custom_args: Vec<String>,
    /// Environment variables set for the Redis process
    pub environment: BTreeMap<String, String>,
    pub hooks: LifecycleHooks,
}

/// Scripts run around service lifecycle transitions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifecycleHooks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_stop: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_stop: Option<String>,
}

impl LifecycleHooks {
    /// Configured hooks with their document keys
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("preStart", self.pre_start.as_deref()),
            ("postStart", self.post_start.as_deref()),
            ("preStop", self.pre_stop.as_deref()),
            ("postStop", self.post_stop.as_deref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metadata {
    pub config_version: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// Complete service configuration.
///
/// A value is immutable once published; changes produce a new instance.
/// Secret tokens stay in the string fields, the values they resolved to are
/// kept on the side and never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Schema version of the document
    #[serde(default)]
    pub version: String,
    pub backend: BackendSettings,
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub monitoring: MonitoringSettings,
    #[serde(default)]
    pub performance: PerformanceSettings,
    #[serde(default)]
    pub advanced: AdvancedSettings,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(skip)]
    resolved: Arc<ResolvedValues>,
}

// Resolved secrets are derived state and take no part in equality.
impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.backend == other.backend
            && self.redis == other.redis
            && self.service == other.service
            && self.monitoring == other.monitoring
            && self.performance == other.performance
            && self.advanced == other.advanced
            && self.metadata == other.metadata
    }
}

impl Configuration {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version: String,
        backend: BackendSettings,
        redis: RedisSettings,
        service: ServiceSettings,
        monitoring: MonitoringSettings,
        performance: PerformanceSettings,
        advanced: AdvancedSettings,
        metadata: Metadata,
    ) -> Self {
        Self {
            version,
            backend,
            redis,
            service,
            monitoring,
            performance,
            advanced,
            metadata,
            resolved: Arc::default(),
        }
    }

    /// Kind of the configured backend
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// WSL settings, if WSL is the active backend
    pub fn wsl(&self) -> Option<&WslSettings> {
        match &self.backend {
            BackendSettings::Wsl(wsl) => Some(wsl),
            BackendSettings::Docker(_) => None,
        }
    }

    /// Docker settings, if Docker is the active backend
    pub fn docker(&self) -> Option<&DockerSettings> {
        match &self.backend {
            BackendSettings::Docker(docker) => Some(docker),
            BackendSettings::Wsl(_) => None,
        }
    }

    /// Attach the values that secret tokens resolved to
    pub fn with_resolved(mut self, resolved: ResolvedValues) -> Self {
        self.resolved = Arc::new(resolved);
        self
    }

    /// Values resolved from secret tokens, keyed by document path
    pub fn resolved_values(&self) -> &ResolvedValues {
        &self.resolved
    }

    /// Drop the resolved value of a field whose raw value was replaced
    pub(crate) fn forget_resolved(&mut self, path: &str) {
        if self.resolved.contains(path) {
            Arc::make_mut(&mut self.resolved).remove(path);
        }
    }

    /// Value a string field takes after secret resolution
    pub fn effective<'a>(&'a self, path: &str, raw: &'a str) -> &'a str {
        self.resolved
            .get(path)
            .map(|secret| secret.expose())
            .unwrap_or(raw)
    }

    /// Record the resolved value of a token field
    pub(crate) fn set_resolved(&mut self, path: &str, secret: Secret) {
        Arc::make_mut(&mut self.resolved).insert(path, secret);
    }

    /// Copy of this configuration with every resolved value written into the
    /// field that holds its token.
    ///
    /// The password keeps its raw form; [`password`](Self::password) still
    /// returns the resolved secret. Validators run against this view.
    pub fn resolved_view(&self) -> serde_json::Result<Configuration> {
        if self.resolved.iter().all(|(path, _)| path == PASSWORD_PATH) {
            return Ok(self.clone());
        }

        let mut tree = self.to_document()?;
        for (path, secret) in self.resolved.iter() {
            if path == PASSWORD_PATH {
                continue;
            }
            if let Some(leaf) = document::leaf_mut(&mut tree, path) {
                *leaf = serde_json::Value::String(secret.expose().to_string());
            }
        }

        let mut view: Configuration = serde_json::from_value(tree)?;
        view.resolved = Arc::clone(&self.resolved);
        Ok(view)
    }

    /// Effective authentication secret
    pub fn password(&self) -> Option<&str> {
        self.redis
            .password
            .as_deref()
            .map(|raw| self.effective(PASSWORD_PATH, raw))
    }

    /// Persisted form of this configuration as a JSON tree.
    ///
    /// Secret fields keep their tokens.
    pub fn to_document(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    /// SHA-256 of the persisted form, hex encoded
    pub fn fingerprint(&self) -> serde_json::Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }

    /// Whether any log level is set to debug or finer
    pub fn uses_debug_logging(&self) -> bool {
        let redis_debug = matches!(
            self.redis.log_level.parse::<RedisLogLevel>(),
            Ok(RedisLogLevel::Debug)
        );
        let service_debug = matches!(
            self.monitoring.logging.level.parse::<ServiceLogLevel>(),
            Ok(ServiceLogLevel::Debug | ServiceLogLevel::Trace)
        );
        redis_debug || service_debug
    }
}
