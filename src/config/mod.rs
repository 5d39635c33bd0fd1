//! Configuration module
//!
//! This module handles the Redis service configuration: the document model,
//! loading and saving, secret resolution, schema migration, validation and
//! safe hot reload.

// Submodules
pub mod builder;
pub mod cache;
pub mod change;
pub mod defaults;
pub mod document;
pub mod error;
pub mod loader;
pub mod manager;
pub mod migration;
pub mod secrets;
pub mod source;
pub mod types;
pub mod validation;
pub mod watcher;

// Re-export types and traits
pub use self::builder::ConfigBuilder;
pub use self::cache::ConfigCache;
pub use self::change::{
    ChangeAnalysis, ChangeAnalyzer, ChangeClassification, FieldChange, SettingsGroup,
};
pub use self::defaults::{ConfigDefaults, DEFAULT_CONFIG_FILE, ENV_PREFIX};
pub use self::error::{InvalidValue, LoadError, SaveError, SecretUnavailable};
pub use self::loader::ConfigLoader;
pub use self::manager::{ConfigChangeEvent, ConfigManager, ReloadOutcome, ReloadResult};
pub use self::migration::CURRENT_SCHEMA_VERSION;
pub use self::secrets::{
    CredentialStore, ProcessEnvironment, ResolvedValues, Secret, SecretResolver, SecretSource,
};
pub use self::source::{ConfigSource, DefaultSource, EnvSource};
pub use self::types::{
    AdvancedSettings, BackendKind, BackendSettings, Configuration, DockerSettings,
    EvictionPolicy, LifecycleHooks, Metadata, MonitoringSettings, PerformanceSettings,
    PersistenceMode, RecoveryAction, RedisSettings, ServiceSettings, StartType, WslSettings,
};
pub use self::validation::{
    ConfigValidator, ProductionReadiness, Severity, ValidationIssue, ValidationReport,
    ValidationResult, Validator,
};
pub use self::watcher::{ConfigWatcher, FileChangeEvent};
