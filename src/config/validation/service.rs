//! Service lifecycle validation

use super::{ValidationResult, Validator};
use crate::config::types::{Configuration, RecoveryActionType, RecoverySettings, StartType};

/// Longest service or display name the service control manager accepts
const MAX_NAME_LENGTH: usize = 256;

/// Recovery delays above this are reported as unusually long
const LONG_DELAY_SECONDS: i64 = 300;

/// Device names Windows reserves in every directory
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const FORBIDDEN_NAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Validates the `service` settings group
#[derive(Debug, Default, Clone, Copy)]
pub struct ServiceValidator;

impl Validator for ServiceValidator {
    fn name(&self) -> &'static str {
        "service"
    }

    fn validate(&self, config: &Configuration) -> ValidationResult {
        let service = &config.service;
        let mut result = ValidationResult::success();

        // Service name
        let name = service.name.trim();
        if name.is_empty() {
            result.error("service.name", "Service name is required");
        } else {
            if name.chars().count() > MAX_NAME_LENGTH {
                result.error(
                    "service.name",
                    format!("Service name must be at most {} characters", MAX_NAME_LENGTH),
                );
            }
            if is_reserved(name) {
                result.error("service.name", format!("'{}' is a reserved device name", name));
            }
            if name
                .chars()
                .any(|c| c.is_control() || FORBIDDEN_NAME_CHARS.contains(&c))
            {
                result.error(
                    "service.name",
                    "Service name must not contain path separators or any of * ? \" < > |",
                );
            }
        }

        // Display name
        if service.display_name.trim().is_empty() {
            result.error("service.displayName", "Display name is required");
        } else if service.display_name.chars().count() > MAX_NAME_LENGTH {
            result.error(
                "service.displayName",
                format!("Display name must be at most {} characters", MAX_NAME_LENGTH),
            );
        }

        // Start type
        match service.start_type.parse::<StartType>() {
            Ok(StartType::Automatic) => {}
            Ok(StartType::Manual) => result.info(
                "service.startType",
                "Service is set to Manual and will not start with Windows",
            ),
            Ok(StartType::Disabled) => result.warning(
                "service.startType",
                "Service is Disabled and cannot be started until the start type is changed",
            ),
            Err(err) => result.error("service.startType", err.to_string()),
        }

        validate_recovery(&service.recovery, &mut result);

        result
    }
}

fn is_reserved(name: &str) -> bool {
    // `NUL.txt` is just as reserved as `NUL`
    let stem = name.split('.').next().unwrap_or(name).trim();
    RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(stem))
}

fn validate_recovery(recovery: &RecoverySettings, result: &mut ValidationResult) {
    if recovery.reset_period_seconds <= 0 {
        result.error(
            "service.recovery.resetPeriodSeconds",
            "Reset period must be a positive number of seconds",
        );
    }

    if recovery.actions.is_empty() {
        result.warning(
            "service.recovery.actions",
            "No recovery actions configured; the service will not recover from failures",
        );
    }

    for (i, action) in recovery.actions.iter().enumerate() {
        if let Err(err) = action.action_type.parse::<RecoveryActionType>() {
            result.error(format!("service.recovery.actions[{i}].type"), err.to_string());
        }

        let path = format!("service.recovery.actions[{i}].delaySeconds");
        if action.delay_seconds < 0 {
            result.error(path, "Delay must not be negative");
        } else if action.delay_seconds > LONG_DELAY_SECONDS {
            result.info(
                path,
                format!("Delay of {}s is longer than 5 minutes", action.delay_seconds),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults;
    use crate::config::types::{BackendKind, RecoveryAction};
    use crate::config::validation::Severity;

    fn config() -> Configuration {
        defaults::configuration(BackendKind::Wsl)
    }

    #[test]
    fn test_defaults_are_clean() {
        assert!(ServiceValidator.validate(&config()).is_empty());
    }

    #[test]
    fn test_reserved_and_invalid_names() {
        let long = "r".repeat(257);
        for name in ["CON", "nul.txt", "Redis/Cache", "", long.as_str()] {
            let mut config = config();
            config.service.name = name.to_string();
            let result = ServiceValidator.validate(&config);
            assert!(!result.is_success(), "{:?} should be rejected", name);
            assert!(result.at("service.name").count() >= 1);
        }
    }

    #[test]
    fn test_start_types() {
        let mut config = config();
        config.service.start_type = "Manual".to_string();
        let result = ServiceValidator.validate(&config);
        assert_eq!(result.at("service.startType").next().unwrap().severity, Severity::Info);

        config.service.start_type = "disabled".to_string();
        let result = ServiceValidator.validate(&config);
        assert_eq!(result.at("service.startType").next().unwrap().severity, Severity::Warning);

        config.service.start_type = "OnDemand".to_string();
        assert!(!ServiceValidator.validate(&config).is_success());
    }

    #[test]
    fn test_recovery_actions() {
        let mut config = config();
        config.service.recovery.reset_period_seconds = 0;
        config.service.recovery.actions = vec![
            RecoveryAction::new("restart", -5),
            RecoveryAction::new("explode", 0),
            RecoveryAction::new("reboot", 600),
        ];

        let result = ServiceValidator.validate(&config);
        assert!(!result.is_success());
        assert_eq!(result.at("service.recovery.resetPeriodSeconds").count(), 1);
        assert_eq!(
            result.at("service.recovery.actions[0].delaySeconds").next().unwrap().severity,
            Severity::Error
        );
        assert_eq!(result.at("service.recovery.actions[1].type").count(), 1);
        assert_eq!(
            result.at("service.recovery.actions[2].delaySeconds").next().unwrap().severity,
            Severity::Info
        );
    }

    #[test]
    fn test_empty_recovery_is_warning() {
        let mut config = config();
        config.service.recovery.actions.clear();

        let result = ServiceValidator.validate(&config);
        assert!(result.is_success());
        assert_eq!(result.count(Severity::Warning), 1);
    }
}
