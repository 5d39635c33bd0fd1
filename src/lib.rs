//! Redis Service Config: configuration management for a Redis hosting service
//!
//! This library owns the configuration of a service that runs Redis either
//! inside a WSL distribution or as a Docker container. It validates
//! configurations, resolves secret references, reloads changed files without
//! ever putting an invalid or half-read configuration into effect, and
//! migrates documents written by older schema versions.
//!
//! # Main Features
//!
//! - Layered validation with severities and production readiness checks
//! - `${env:NAME}` and `${cred:NAME}` secret references that are never persisted resolved
//! - Hot reload with change classification (hot applicable, restart required, rejected)
//! - Lock-free configuration cache and coalesced concurrent reloads
//! - Schema versioning with automatic migration on load
//!
//! # Example
//!
//! ```no_run
//! use redis_service_config::config::{ConfigLoader, ConfigManager, ConfigWatcher};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> redis_service_config::Result<()> {
//!     redis_service_config::init_logger("info");
//!
//!     let path = Path::new("redis-service.json");
//!     let manager = ConfigManager::new(ConfigLoader::default());
//!     let config = manager.load(path)?;
//!     println!("Redis listens on port {}", config.redis.port);
//!
//!     // Reload whenever the file changes
//!     let (watcher, events) = ConfigWatcher::new(path);
//!     let _watcher = watcher.run()?;
//!     manager.spawn_event_loop(events).await.ok();
//!
//!     Ok(())
//! }
//! ```

// Public modules
pub mod common;
pub mod config;

// Re-export commonly used structures and functions for convenience
pub use common::{init_logger, Result, ServiceError};
pub use config::{
    ConfigBuilder, ConfigLoader, ConfigManager, ConfigValidator, Configuration, ValidationReport,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
