//! Validation tests
//!
//! End to end checks of the validator orchestration and its reports.

use std::sync::Arc;

use redis_service_config::config::{
    defaults, BackendKind, ConfigBuilder, ConfigValidator, Configuration, CredentialStore,
    SecretResolver, Severity,
};

fn validator() -> ConfigValidator {
    ConfigValidator::default()
}

fn resolved(config: Configuration, env: CredentialStore) -> Configuration {
    SecretResolver::new(Arc::new(env), Arc::new(CredentialStore::new()))
        .resolve(config)
        .unwrap()
}

#[test]
fn test_defaults_have_no_blocking_issues() {
    for kind in [BackendKind::Wsl, BackendKind::Docker] {
        let result = validator().validate(&defaults::configuration(kind));
        assert!(result.is_success(), "{:?}", result.issues());
        assert!(!result.has_severity(Severity::Error));
        assert!(!result.has_severity(Severity::Critical));
    }
}

#[test]
fn test_negative_port_names_valid_range() {
    let mut config = defaults::configuration(BackendKind::Wsl);
    config.redis.port = -1;

    let result = validator().validate(&config);
    assert!(!result.is_success());

    let issue = result
        .at("redis.port")
        .find(|issue| issue.severity == Severity::Error)
        .expect("port error");
    assert!(issue.message.contains("1"));
    assert!(issue.message.contains("65535"));
}

#[test]
fn test_required_password_resolving_to_empty_is_critical() {
    let mut config = defaults::configuration(BackendKind::Wsl);
    config.redis.require_password = true;
    config.redis.password = Some("${env:REDIS_PASSWORD}".to_string());
    let config = resolved(config, CredentialStore::new().with("REDIS_PASSWORD", ""));

    let result = validator().validate(&config);
    assert!(!result.is_success());
    assert!(result
        .at("redis.password")
        .any(|issue| issue.severity == Severity::Critical));
}

#[test]
fn test_no_auth_and_no_persistence_is_not_production_ready() {
    let config = ConfigBuilder::new(BackendKind::Wsl)
        .no_password()
        .persistence(None)
        .build()
        .unwrap();

    let report = validator().validate_with_report(config);
    assert!(report.is_success());

    let readiness = report.production_readiness();
    assert!(!readiness.ready);
    assert_eq!(readiness.concerns.len(), 2);

    let readiness_warnings: Vec<_> = report
        .result
        .with_severity(Severity::Warning)
        .filter(|issue| issue.message.starts_with("Not production ready"))
        .map(|issue| issue.path.as_str())
        .collect();
    assert!(readiness_warnings.contains(&"redis.requirePassword"));
    assert!(readiness_warnings.contains(&"redis.enablePersistence"));
}

#[test]
fn test_hardened_configuration_is_production_ready() {
    let config = ConfigBuilder::new(BackendKind::Wsl)
        .password("C0rrect-Horse-Battery")
        .persistence(Some("both"))
        .build()
        .unwrap();

    let report = validator().validate_with_report(config);
    assert!(report.is_production_ready(), "{}", report.summary());
    assert!(report.production_readiness().concerns.is_empty());
}

#[test]
fn test_debug_logging_is_flagged() {
    let config = ConfigBuilder::new(BackendKind::Wsl)
        .password("C0rrect-Horse-Battery")
        .redis_log_level("debug")
        .build()
        .unwrap();

    let report = validator().validate_with_report(config);
    assert!(report.is_success());
    assert!(!report.is_production_ready());
    assert!(report
        .result
        .at("redis.logLevel")
        .any(|issue| issue.severity == Severity::Warning));
}

#[test]
fn test_every_invalid_field_is_reported() {
    let config = ConfigBuilder::new(BackendKind::Docker)
        .port(70000)
        .max_memory("lots", "keep-everything")
        .service_name("", "")
        .memory_thresholds(120, 50)
        .without_validation()
        .build()
        .unwrap();

    let result = validator().validate(&config);
    let paths: Vec<_> = result.issues().iter().map(|issue| issue.path.as_str()).collect();
    for expected in [
        "redis.port",
        "redis.maxMemory",
        "redis.maxMemoryPolicy",
        "service.name",
        "performance.memoryWarningThreshold",
    ] {
        assert!(paths.contains(&expected), "missing issue for {}: {:?}", expected, paths);
    }
}

#[test]
fn test_docker_port_collision_is_informational() {
    let config = defaults::configuration(BackendKind::Docker);

    let result = validator().validate(&config);
    assert!(result.is_success());
    assert!(result
        .with_severity(Severity::Info)
        .any(|issue| issue.path.starts_with("backend.portMappings")));
}

#[test]
fn test_summary_never_contains_secret() {
    let config = ConfigBuilder::new(BackendKind::Wsl)
        .password("${env:REDIS_PASSWORD}")
        .without_validation()
        .build()
        .unwrap();
    let config = resolved(config, CredentialStore::new().with("REDIS_PASSWORD", "letmein"));

    let report = validator().validate_with_report(config);
    // Weak, so it is scored, but never echoed
    assert!(report.result.at("redis.password").next().is_some());
    assert!(!report.summary().contains("letmein"));
    for issue in report.result.issues() {
        assert!(!issue.message.contains("letmein"));
    }
}
