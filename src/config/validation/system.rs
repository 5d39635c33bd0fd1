//! System settings validation
//!
//! Covers the groups that do not configure Redis itself: monitoring,
//! performance, advanced settings and metadata.

use std::time::Duration;

use chrono::Utc;

use super::rules;
use super::{ValidationResult, Validator};
use crate::config::types::{
    AdvancedSettings, Configuration, Metadata, MonitoringSettings, PerformanceSettings,
    ServiceLogLevel,
};

/// Environment variables owned by the operating system
const RESERVED_ENV_KEYS: &[&str] = &[
    "PATH", "SYSTEMROOT", "WINDIR", "TEMP", "TMP", "USERPROFILE", "COMSPEC", "HOME",
];

/// Script extensions hooks are expected to have
const HOOK_EXTENSIONS: &[&str] = &["ps1", "bat", "cmd", "exe", "sh", "py"];

/// Validates monitoring, performance, advanced and metadata settings
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemValidator {
    clock_skew: Duration,
}

impl SystemValidator {
    /// Create a validator tolerating metadata timestamps up to
    /// `clock_skew` in the future
    pub fn new(clock_skew: Duration) -> Self {
        Self { clock_skew }
    }
}

impl Validator for SystemValidator {
    fn name(&self) -> &'static str {
        "system"
    }

    fn validate(&self, config: &Configuration) -> ValidationResult {
        let mut result = ValidationResult::success();

        validate_monitoring(&config.monitoring, &mut result);
        validate_performance(&config.performance, &mut result);
        validate_advanced(&config.advanced, &mut result);
        self.validate_metadata(&config.metadata, &mut result);

        result
    }
}

fn validate_monitoring(monitoring: &MonitoringSettings, result: &mut ValidationResult) {
    // Health check
    let health = &monitoring.health_check;
    if health.enabled {
        if health.interval_seconds <= 0 {
            result.error(
                "monitoring.healthCheck.intervalSeconds",
                "Health check interval must be positive",
            );
        }
        if health.timeout_seconds <= 0 {
            result.error(
                "monitoring.healthCheck.timeoutSeconds",
                "Health check timeout must be positive",
            );
        }
        if health.interval_seconds > 0
            && health.timeout_seconds > 0
            && health.timeout_seconds >= health.interval_seconds
        {
            result.warning(
                "monitoring.healthCheck.timeoutSeconds",
                "Health check timeout should be shorter than the interval",
            );
        }
    }

    // Logging
    let logging = &monitoring.logging;
    if let Err(err) = logging.level.parse::<ServiceLogLevel>() {
        result.error("monitoring.logging.level", err.to_string());
    }

    let file = &logging.file;
    if file.enabled {
        if !rules::is_valid_path(&file.path) {
            result.error(
                "monitoring.logging.file.path",
                format!("'{}' is not a valid log file path", file.path),
            );
        }
        if file.max_size_mb <= 0 {
            result.error("monitoring.logging.file.maxSizeMb", "Maximum log file size must be positive");
        }
        if file.max_files <= 0 {
            result.error("monitoring.logging.file.maxFiles", "Number of kept log files must be positive");
        }
    }

    if !logging.console && !logging.event_log && !file.enabled {
        result.warning("monitoring.logging", "All logging sinks are disabled");
    }
}

fn validate_performance(performance: &PerformanceSettings, result: &mut ValidationResult) {
    // Memory thresholds
    let warning = performance.memory_warning_threshold;
    let error = performance.memory_error_threshold;
    for (path, value) in [
        ("performance.memoryWarningThreshold", warning),
        ("performance.memoryErrorThreshold", error),
    ] {
        if !(0..=100).contains(&value) {
            result.error(path, format!("Threshold {} must be between 0 and 100", value));
        }
    }
    if warning >= error {
        result.error(
            "performance.memoryWarningThreshold",
            format!(
                "Warning threshold ({}) must be lower than the error threshold ({})",
                warning, error
            ),
        );
    }

    // Auto restart
    let restart = &performance.auto_restart;
    if restart.enabled {
        if restart.max_attempts <= 0 {
            result.error("performance.autoRestart.maxAttempts", "Maximum restart attempts must be positive");
        }
        if restart.cooldown_seconds <= 0 {
            result.error("performance.autoRestart.cooldownSeconds", "Restart cooldown must be positive");
        }
    }

    // Slow log
    let slow_log = &performance.slow_log;
    if slow_log.enabled && slow_log.threshold_ms <= 0 {
        result.error("performance.slowLog.thresholdMs", "Slow log threshold must be positive");
    }
}

fn validate_advanced(advanced: &AdvancedSettings, result: &mut ValidationResult) {
    for (i, arg) in advanced.custom_args.iter().enumerate() {
        if arg.trim().is_empty() {
            result.error(format!("advanced.customArgs[{i}]"), "Startup argument must not be empty");
        }
    }

    for key in advanced.environment.keys() {
        if key.trim().is_empty() {
            result.error("advanced.environment", "Environment variable name must not be empty");
            continue;
        }

        let path = format!("advanced.environment.{key}");
        if key.contains('=') {
            result.error(path, "Environment variable name must not contain '='");
        } else if RESERVED_ENV_KEYS.iter().any(|r| r.eq_ignore_ascii_case(key)) {
            result.warning(path, format!("'{}' overrides a system environment variable", key));
        }
    }

    for (key, script) in advanced.hooks.entries() {
        let path = format!("advanced.hooks.{key}");
        if !rules::is_valid_path(script) {
            result.error(path, format!("'{}' is not a valid script path", script));
            continue;
        }

        match rules::extension(script) {
            Some(ext) if HOOK_EXTENSIONS.contains(&ext.as_str()) => {}
            Some(ext) => result.info(path, format!("Unusual script extension '.{}'", ext)),
            None => result.info(path, "Script has no file extension"),
        }
    }
}

impl SystemValidator {
    fn validate_metadata(&self, metadata: &Metadata, result: &mut ValidationResult) {
        let skew = chrono::Duration::from_std(self.clock_skew).unwrap_or_else(|_| chrono::Duration::zero());
        let latest = Utc::now() + skew;

        if metadata.created > latest {
            result.error("metadata.created", "Creation date lies in the future");
        }
        if metadata.modified > latest {
            result.error("metadata.modified", "Modification date lies in the future");
        }
        if metadata.modified < metadata.created {
            result.error("metadata.modified", "Modification date is earlier than the creation date");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults;
    use crate::config::types::BackendKind;
    use crate::config::validation::Severity;

    fn config() -> Configuration {
        defaults::configuration(BackendKind::Wsl)
    }

    #[test]
    fn test_defaults_are_clean() {
        assert!(SystemValidator::default().validate(&config()).is_empty());
    }

    #[test]
    fn test_thresholds() {
        let mut config = config();
        config.performance.memory_warning_threshold = 95;
        config.performance.memory_error_threshold = 90;

        let result = SystemValidator::default().validate(&config);
        assert!(!result.is_success());
        assert_eq!(result.at("performance.memoryWarningThreshold").count(), 1);

        config.performance.memory_error_threshold = 120;
        let result = SystemValidator::default().validate(&config);
        assert_eq!(result.at("performance.memoryErrorThreshold").count(), 1);
    }

    #[test]
    fn test_health_check_rules() {
        let mut config = config();
        config.monitoring.health_check.timeout_seconds = 30;
        let result = SystemValidator::default().validate(&config);
        assert!(result.is_success());
        assert_eq!(result.count(Severity::Warning), 1);

        config.monitoring.health_check.interval_seconds = 0;
        assert!(!SystemValidator::default().validate(&config).is_success());

        config.monitoring.health_check.enabled = false;
        assert!(SystemValidator::default().validate(&config).is_success());
    }

    #[test]
    fn test_logging_rules() {
        let mut config = config();
        config.monitoring.logging.file.path = "C:\\logs\\<redis>.log".to_string();
        config.monitoring.logging.file.max_files = 0;
        config.monitoring.logging.level = "verbose".to_string();

        let result = SystemValidator::default().validate(&config);
        assert_eq!(result.count(Severity::Error), 3);

        let mut config = self::config();
        config.monitoring.logging.console = false;
        config.monitoring.logging.event_log = false;
        config.monitoring.logging.file.enabled = false;
        let result = SystemValidator::default().validate(&config);
        assert_eq!(result.at("monitoring.logging").next().unwrap().severity, Severity::Warning);
    }

    #[test]
    fn test_advanced_rules() {
        let mut config = config();
        config.advanced.custom_args = vec!["--appendfsync".to_string(), " ".to_string()];
        config.advanced.environment.insert("Path".to_string(), "C:\\bin".to_string());
        config.advanced.environment.insert("A=B".to_string(), "1".to_string());
        config.advanced.hooks.pre_start = Some("C:\\hooks\\warmup.ps1".to_string());
        config.advanced.hooks.post_stop = Some("C:\\hooks\\notify.js".to_string());

        let result = SystemValidator::default().validate(&config);
        assert_eq!(result.at("advanced.customArgs[1]").count(), 1);
        assert_eq!(result.at("advanced.environment.Path").next().unwrap().severity, Severity::Warning);
        assert_eq!(result.at("advanced.environment.A=B").next().unwrap().severity, Severity::Error);
        assert_eq!(result.at("advanced.hooks.preStart").count(), 0);
        assert_eq!(result.at("advanced.hooks.postStop").next().unwrap().severity, Severity::Info);
    }

    #[test]
    fn test_metadata_dates() {
        let mut config = config();
        config.metadata.created = Utc::now() + chrono::Duration::hours(1);

        let result = SystemValidator::default().validate(&config);
        assert_eq!(result.at("metadata.created").count(), 1);
        assert_eq!(result.at("metadata.modified").count(), 1);

        let tolerant = SystemValidator::new(Duration::from_secs(7200));
        let result = tolerant.validate(&config);
        assert_eq!(result.at("metadata.created").count(), 0);
        assert_eq!(result.at("metadata.modified").count(), 1);
    }
}
