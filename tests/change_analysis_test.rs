//! Change analysis tests
//!
//! Classification of the difference between a running configuration and a
//! candidate read back from disk.

use std::sync::Arc;

use redis_service_config::config::{
    defaults, BackendKind, ChangeAnalysis, ChangeAnalyzer, ChangeClassification, ConfigBuilder, Configuration,
    CredentialStore, SecretResolver, SettingsGroup, Severity,
};

fn running() -> Configuration {
    ConfigBuilder::new(BackendKind::Wsl)
        .password("C0rrect-Horse-Battery")
        .build()
        .unwrap()
}

fn analyze(previous: &Configuration, candidate: Configuration) -> ChangeAnalysis {
    ChangeAnalyzer::default().analyze(previous, candidate).unwrap()
}

#[test]
fn test_identical_configurations() {
    let previous = running();
    let analysis = analyze(&previous, previous.clone());

    assert_eq!(analysis.classification, ChangeClassification::NoChange);
    assert!(analysis.changes.is_empty());
}

#[test]
fn test_log_level_to_debug_is_hot_with_warning() {
    let previous = running();
    let mut candidate = previous.clone();
    candidate.redis.log_level = "debug".to_string();

    let analysis = analyze(&previous, candidate);
    assert_eq!(analysis.classification, ChangeClassification::HotApplicable);
    assert_eq!(analysis.changed_paths().collect::<Vec<_>>(), vec!["redis.logLevel"]);
    assert!(analysis
        .issues()
        .iter()
        .any(|issue| issue.path == "redis.logLevel" && issue.severity == Severity::Warning));
}

#[test]
fn test_port_change_dominates_hot_changes() {
    let previous = running();
    let mut candidate = previous.clone();
    candidate.redis.port = 6380;
    candidate.monitoring.health_check.interval_seconds = 45;
    candidate.performance.memory_warning_threshold = 70;
    candidate.metadata.author = "ops".to_string();

    let analysis = analyze(&previous, candidate);
    assert_eq!(analysis.classification, ChangeClassification::RequiresRestart);

    let groups = analysis.groups();
    assert_eq!(groups[&SettingsGroup::DataStore], ChangeClassification::RequiresRestart);
    assert_eq!(groups[&SettingsGroup::Monitoring], ChangeClassification::HotApplicable);
    assert_eq!(groups[&SettingsGroup::Performance], ChangeClassification::HotApplicable);
    assert_eq!(groups[&SettingsGroup::Metadata], ChangeClassification::HotApplicable);
}

#[test]
fn test_restart_sensitive_fields() {
    let previous = running();

    let mut persistence = previous.clone();
    persistence.redis.persistence_mode = Some("aof".to_string());

    let mut memory = previous.clone();
    memory.redis.max_memory = "1gb".to_string();

    let mut policy = previous.clone();
    policy.redis.max_memory_policy = "volatile-lru".to_string();

    let mut start_type = previous.clone();
    start_type.service.start_type = "Manual".to_string();

    let mut backend = previous.clone();
    backend.backend = defaults::backend(BackendKind::Docker);

    for candidate in [persistence, memory, policy, start_type, backend] {
        let analysis = analyze(&previous, candidate);
        assert_eq!(
            analysis.classification,
            ChangeClassification::RequiresRestart,
            "{:?}",
            analysis.changes
        );
    }
}

#[test]
fn test_hot_applicable_groups() {
    let previous = running();
    let mut candidate = previous.clone();
    candidate.monitoring.logging.level = "warning".to_string();
    candidate.performance.slow_log.threshold_ms = 500;
    candidate.service.description = "Session cache".to_string();
    candidate.service.recovery.reset_period_seconds = 3600;

    let analysis = analyze(&previous, candidate);
    assert_eq!(analysis.classification, ChangeClassification::HotApplicable);
    assert_eq!(analysis.changes.len(), 4);
}

#[test]
fn test_invalid_candidate_is_rejected() {
    let previous = running();
    let mut candidate = previous.clone();
    candidate.redis.port = 0;
    candidate.redis.log_level = "debug".to_string();

    let analysis = analyze(&previous, candidate);
    assert_eq!(analysis.classification, ChangeClassification::Rejected);
    assert!(analysis.is_rejected());
    assert!(analysis
        .issues()
        .iter()
        .any(|issue| issue.path == "redis.port" && issue.severity.is_blocking()));
}

#[test]
fn test_enabling_auth_without_secret_is_rejected() {
    let previous = defaults::configuration(BackendKind::Wsl);
    let mut candidate = previous.clone();
    candidate.redis.require_password = true;

    let analysis = analyze(&previous, candidate);
    assert_eq!(analysis.classification, ChangeClassification::Rejected);
    assert!(analysis
        .issues()
        .iter()
        .any(|issue| issue.path == "redis.password" && issue.severity == Severity::Critical));
}

#[test]
fn test_enabling_auth_with_unresolvable_token_is_rejected() {
    let empty = || Arc::new(CredentialStore::new());
    let analyzer = ChangeAnalyzer::default().with_resolver(SecretResolver::new(empty(), empty()));

    let previous = defaults::configuration(BackendKind::Wsl);
    let mut candidate = previous.clone();
    candidate.redis.require_password = true;
    candidate.redis.password = Some("${env:NEVER_SET_REDIS_PASSWORD}".to_string());

    let analysis = analyzer.analyze(&previous, candidate.clone()).unwrap();
    assert_eq!(analysis.classification, ChangeClassification::Rejected);
    assert!(analysis
        .issues()
        .iter()
        .any(|issue| issue.path == "redis.password" && issue.severity == Severity::Critical));

    // The same candidate is a restart once the secret exists
    let store = Arc::new(CredentialStore::new().with("NEVER_SET_REDIS_PASSWORD", "N0w-It-Exists!"));
    let analyzer = ChangeAnalyzer::default().with_resolver(SecretResolver::new(store, empty()));
    let analysis = analyzer.analyze(&previous, candidate).unwrap();
    assert_eq!(analysis.classification, ChangeClassification::RequiresRestart);
}

#[test]
fn test_rotated_secret_behind_same_token_requires_restart() {
    let token_config = ConfigBuilder::new(BackendKind::Wsl)
        .password("${env:REDIS_PASSWORD}")
        .build()
        .unwrap();
    let resolve = |value: &str| {
        SecretResolver::new(
            Arc::new(CredentialStore::new().with("REDIS_PASSWORD", value)),
            Arc::new(CredentialStore::new()),
        )
        .resolve(token_config.clone())
        .unwrap()
    };

    let previous = resolve("First-Secret-1");
    let candidate = resolve("Second-Secret-2");
    assert_eq!(previous.redis.password, candidate.redis.password);

    let analysis = analyze(&previous, candidate);
    assert_eq!(analysis.classification, ChangeClassification::RequiresRestart);
    assert_eq!(analysis.changed_paths().collect::<Vec<_>>(), vec!["redis.password"]);
}
