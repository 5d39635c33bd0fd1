//! Configuration tests
//!
//! This module contains tests for loading, saving and building configurations.

use std::env;
use std::fs;
use std::sync::Arc;

use serial_test::serial;
use tempfile::tempdir;

use redis_service_config::config::{
    BackendKind, ConfigBuilder, ConfigLoader, CredentialStore, LoadError, SaveError,
    SecretResolver, Severity, CURRENT_SCHEMA_VERSION,
};

fn loader_with_secrets(env: CredentialStore, cred: CredentialStore) -> ConfigLoader {
    ConfigLoader::default().with_resolver(SecretResolver::new(Arc::new(env), Arc::new(cred)))
}

/// Test default configurations
#[test]
fn test_default_configurations() {
    let loader = ConfigLoader::default();

    for kind in [BackendKind::Wsl, BackendKind::Docker] {
        let config = loader.create_default(kind);
        assert_eq!(config.kind(), kind);
        assert_eq!(config.version, CURRENT_SCHEMA_VERSION);
        assert_eq!(config.redis.port, 6379);

        // Defaults are usable as they are
        let report = loader.validate(&config);
        assert!(report.is_success(), "{}", report.summary());
    }
}

/// Test that a saved configuration loads back equal
#[test]
fn test_save_load_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("redis-service.json");
    let loader = ConfigLoader::default();

    let config = ConfigBuilder::new(BackendKind::Docker)
        .port(6390)
        .persistence(Some("aof"))
        .health_check(true, 15, 5)
        .custom_arg("--appendfsync everysec")
        .environment_variable("TZ", "UTC")
        .build()
        .unwrap();

    loader.save(&config, &path).unwrap();
    let loaded = loader.load(&path).unwrap();

    assert_eq!(loaded, config);
    assert_eq!(loaded.metadata.created, config.metadata.created);
}

/// Test that secrets survive load, save, load as tokens only
#[test]
fn test_secret_token_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("redis-service.json");
    let loader = loader_with_secrets(
        CredentialStore::new(),
        CredentialStore::new().with("redis/primary", "Vault-Held-Secret-9"),
    );

    let config = ConfigBuilder::new(BackendKind::Wsl)
        .password("${cred:redis/primary}")
        .build()
        .unwrap();
    loader.save(&config, &path).unwrap();

    let first = loader.load(&path).unwrap();
    assert_eq!(first.password(), Some("Vault-Held-Secret-9"));
    assert!(!format!("{:?}", first).contains("Vault-Held-Secret-9"));
    assert!(!loader.validate(&first).summary().contains("Vault-Held-Secret-9"));

    loader.save(&first, &path).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("${cred:redis/primary}"));
    assert!(!text.contains("Vault-Held-Secret-9"));

    let second = loader.load(&path).unwrap();
    assert_eq!(second.redis.password, first.redis.password);
    assert_eq!(second.password(), Some("Vault-Held-Secret-9"));
}

/// Test that a missing required secret fails the load
#[test]
fn test_missing_required_secret() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("redis-service.json");
    let config = ConfigBuilder::new(BackendKind::Wsl)
        .password("${env:REDIS_PASSWORD}")
        .build()
        .unwrap();
    let writer = loader_with_secrets(
        CredentialStore::new().with("REDIS_PASSWORD", "Rem0ved-Later!"),
        CredentialStore::new(),
    );
    writer.save(&config, &path).unwrap();

    let reader = loader_with_secrets(CredentialStore::new(), CredentialStore::new());
    match reader.load(&path) {
        Err(LoadError::Secret(err)) => {
            assert_eq!(err.identifier, "REDIS_PASSWORD");
            assert_eq!(err.field, "redis.password");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

/// Test that saving refuses a required secret nobody can resolve
#[test]
fn test_save_refuses_unresolvable_required_secret() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("redis-service.json");
    let loader = loader_with_secrets(CredentialStore::new(), CredentialStore::new());

    let config = ConfigBuilder::new(BackendKind::Wsl)
        .password("${env:NEVER_SET_REDIS_PASSWORD}")
        .build()
        .unwrap();

    match loader.save(&config, &path) {
        Err(SaveError::Invalid(issues)) => {
            assert!(issues
                .iter()
                .any(|issue| issue.path == "redis.password" && issue.severity == Severity::Critical));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(!path.exists());
}

/// Test that tokens outside the password are resolved before validation
#[test]
fn test_tokens_in_other_fields_are_resolved() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("redis-service.json");
    let loader = loader_with_secrets(
        CredentialStore::new()
            .with("LOG_DIR", "C:\\Logs")
            .with("BIND", "10.0.0.5"),
        CredentialStore::new(),
    );

    let mut config = loader.create_default(BackendKind::Wsl);
    config.redis.bind_address = "${env:BIND}".to_string();
    config.monitoring.logging.file.path = "${env:LOG_DIR}\\redis.log".to_string();
    loader.save(&config, &path).unwrap();

    let loaded = loader.load(&path).unwrap();
    assert_eq!(loaded.redis.bind_address, "${env:BIND}");
    assert_eq!(loaded.effective("redis.bindAddress", &loaded.redis.bind_address), "10.0.0.5");
    assert_eq!(
        loaded.effective("monitoring.logging.file.path", &loaded.monitoring.logging.file.path),
        "C:\\Logs\\redis.log"
    );

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("${env:BIND}"));
    assert!(!text.contains("10.0.0.5"));

    // A resolved value that fails validation is reported without echoing it
    let bad = loader_with_secrets(
        CredentialStore::new()
            .with("LOG_DIR", "C:\\Logs")
            .with("BIND", "not an address"),
        CredentialStore::new(),
    );
    match bad.load(&path) {
        Err(LoadError::Invalid(issues)) => {
            assert!(issues.iter().any(|issue| issue.path == "redis.bindAddress"));
            assert!(issues.iter().all(|issue| !issue.message.contains("not an address")));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

/// Test that older documents are migrated on load
#[test]
fn test_legacy_document_is_migrated() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("legacy.json");
    fs::write(
        &path,
        r#"{
            "backendType": "Docker",
            "docker": {
                "image": "redis:6.2",
                "containerName": "legacy-redis",
                "portMappings": ["6379:6379"],
                "volumeMappings": ["/srv/redis:/data"]
            },
            "redis": { "port": 6379, "maxMemory": "512mb" }
        }"#,
    )
    .unwrap();

    let loader = ConfigLoader::default();
    let config = loader.load(&path).unwrap();
    assert_eq!(config.version, CURRENT_SCHEMA_VERSION);
    assert_eq!(config.docker().unwrap().image, "redis:6.2");
    assert_eq!(config.redis.max_memory, "512mb");

    // Saving writes the current schema
    loader.save(&config, &path).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains(CURRENT_SCHEMA_VERSION));
    assert!(!text.contains("backendType"));
}

/// Test that an unknown schema version is refused
#[test]
fn test_unsupported_version() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("future.json");
    fs::write(&path, r#"{ "version": "9.0.0", "backend": { "type": "wsl" } }"#).unwrap();

    let err = ConfigLoader::default().load(&path).unwrap_err();
    assert!(matches!(err, LoadError::UnsupportedVersion { .. }), "{:?}", err);
}

/// Test overrides from the process environment
#[test]
#[serial]
fn test_from_environment() {
    env::set_var("REDIS_SERVICE_REDIS_PORT", "6381");
    env::set_var("REDIS_SERVICE_SERVICE_NAME", "RedisFromEnv");
    env::set_var("REDIS_SERVICE_REDIS_MAX_MEMORY", "1gb");

    let result = ConfigLoader::default().from_environment();

    env::remove_var("REDIS_SERVICE_REDIS_PORT");
    env::remove_var("REDIS_SERVICE_SERVICE_NAME");
    env::remove_var("REDIS_SERVICE_REDIS_MAX_MEMORY");

    let config = result.unwrap();
    assert_eq!(config.kind(), BackendKind::Wsl);
    assert_eq!(config.redis.port, 6381);
    assert_eq!(config.redis.max_memory, "1gb");
    assert_eq!(config.service.name, "RedisFromEnv");
}

/// Test that an invalid environment override is reported by variable name
#[test]
#[serial]
fn test_from_environment_invalid_override() {
    env::set_var("REDIS_SERVICE_REDIS_PORT", "not-a-port");
    let result = ConfigLoader::default().from_environment();
    env::remove_var("REDIS_SERVICE_REDIS_PORT");

    match result {
        Err(LoadError::Environment { variable, .. }) => {
            assert_eq!(variable, "REDIS_SERVICE_REDIS_PORT")
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

/// Test that the builder picks up the default environment prefix
#[test]
#[serial]
fn test_builder_default_reads_environment() {
    env::set_var("REDIS_SERVICE_REDIS_BIND_ADDRESS", "0.0.0.0");
    let result = ConfigBuilder::default().password("C0rrect-Horse-Battery").build();
    env::remove_var("REDIS_SERVICE_REDIS_BIND_ADDRESS");

    assert_eq!(result.unwrap().redis.bind_address, "0.0.0.0");
}
