//! Redis settings validation
//!
//! Network, memory, persistence, authentication and log level checks for
//! the `redis` group. Password strength findings never fail validation.
//! No message produced here contains the password.

use super::rules::{self, MAX_PORT, MIB, MIN_PORT, TIB};
use super::{ValidationResult, Validator};
use crate::config::secrets;
use crate::config::types::{
    Configuration, EvictionPolicy, PersistenceMode, RedisLogLevel, RedisSettings, PASSWORD_PATH,
};

/// Passwords that are rejected as too common, compared case-insensitively
const WEAK_PASSWORDS: &[&str] = &[
    "password", "123456", "12345678", "redis", "admin", "changeme", "qwerty", "letmein", "foobared",
];

/// Minimum password length before a warning is raised
const MIN_PASSWORD_LENGTH: usize = 8;

/// Validates the `redis` settings group
#[derive(Debug, Default, Clone, Copy)]
pub struct RedisValidator;

impl Validator for RedisValidator {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn validate(&self, config: &Configuration) -> ValidationResult {
        let redis = &config.redis;
        let mut result = ValidationResult::success();

        validate_network(redis, &mut result);
        validate_memory(redis, &mut result);
        validate_persistence(redis, &mut result);
        validate_authentication(config, &mut result);
        validate_log_level(redis, &mut result);

        result
    }
}

fn validate_network(redis: &RedisSettings, result: &mut ValidationResult) {
    if !rules::is_valid_port(i64::from(redis.port)) {
        result.error(
            "redis.port",
            format!(
                "Port {} is out of range; it must be between {} and {}",
                redis.port, MIN_PORT, MAX_PORT
            ),
        );
    }

    if redis.bind_address.trim().is_empty() {
        result.error("redis.bindAddress", "Bind address is required");
    } else if !rules::is_valid_bind_address(&redis.bind_address) {
        result.error(
            "redis.bindAddress",
            format!("'{}' is not a valid IP address or host name", redis.bind_address),
        );
    }
}

fn validate_memory(redis: &RedisSettings, result: &mut ValidationResult) {
    match rules::parse_memory(&redis.max_memory) {
        None => result.error(
            "redis.maxMemory",
            format!(
                "'{}' must be a positive integer with an optional unit (k, m or g, optionally followed by b)",
                redis.max_memory
            ),
        ),
        Some(bytes) if bytes < MIB => {
            result.warning("redis.maxMemory", "Memory limit is below 1MB; Redis will barely hold any data")
        }
        Some(bytes) if bytes > TIB => {
            result.warning("redis.maxMemory", "Memory limit is above 1TB; check the unit")
        }
        Some(_) => {}
    }

    if let Err(err) = redis.max_memory_policy.parse::<EvictionPolicy>() {
        result.error("redis.maxMemoryPolicy", err.to_string());
    }
}

fn validate_persistence(redis: &RedisSettings, result: &mut ValidationResult) {
    match redis.persistence_mode.as_deref().map(str::trim) {
        Some(mode) if !mode.is_empty() => {
            if let Err(err) = mode.parse::<PersistenceMode>() {
                result.error("redis.persistenceMode", err.to_string());
            }
        }
        _ if redis.enable_persistence => {
            result.error(
                "redis.persistenceMode",
                "Persistence mode is required when persistence is enabled",
            );
        }
        _ => {}
    }
}

fn validate_authentication(config: &Configuration, result: &mut ValidationResult) {
    let redis = &config.redis;
    let raw = redis.password.as_deref().unwrap_or_default();
    let unresolved = secrets::contains_token(raw) && !config.resolved_values().contains(PASSWORD_PATH);
    let password = config.password().unwrap_or_default();

    if !redis.require_password {
        if !raw.is_empty() {
            result.info(
                PASSWORD_PATH,
                "A password is set but requirePassword is false; it will not be enforced",
            );
        }
        return;
    }

    if unresolved {
        result.info(
            PASSWORD_PATH,
            "Password is a secret reference that has not been resolved; strength was not checked",
        );
        return;
    }

    if password.is_empty() {
        result.critical(PASSWORD_PATH, "A password is required when requirePassword is true");
        return;
    }

    check_strength(password, result);
}

fn check_strength(password: &str, result: &mut ValidationResult) {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        result.warning(
            PASSWORD_PATH,
            format!("Password is shorter than {} characters", MIN_PASSWORD_LENGTH),
        );
    }

    if WEAK_PASSWORDS
        .iter()
        .any(|weak| weak.eq_ignore_ascii_case(password))
    {
        result.warning(PASSWORD_PATH, "Password is a commonly used value");
    }

    let classes = [
        ("upper case letters", password.chars().any(|c| c.is_uppercase())),
        ("lower case letters", password.chars().any(|c| c.is_lowercase())),
        ("digits", password.chars().any(|c| c.is_ascii_digit())),
        ("special characters", password.chars().any(|c| !c.is_alphanumeric())),
    ];
    let missing: Vec<_> = classes
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect();

    if !missing.is_empty() {
        result.info(PASSWORD_PATH, format!("Password contains no {}", missing.join(" or ")));
    }
}

fn validate_log_level(redis: &RedisSettings, result: &mut ValidationResult) {
    match redis.log_level.parse::<RedisLogLevel>() {
        Ok(RedisLogLevel::Debug) => result.warning(
            "redis.logLevel",
            "Debug logging slows Redis down and may write sensitive data to the log",
        ),
        Ok(_) => {}
        Err(err) => result.error("redis.logLevel", err.to_string()),
    }
}
