//! Logging utilities
//!
//! This module provides helpers for setting up the logging system.

/// Initialize the logging system
///
/// `RUST_LOG` wins over `level` when set. Calling this more than once is
/// harmless; later calls keep the first logger.
///
/// # Parameters
///
/// * `level` - Default log filter, e.g. `info` or `redis_service_config=debug`
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    if env_logger::Builder::from_env(env).try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logger_twice() {
        init_logger("debug");
        init_logger("info");
    }
}
