//! Schema migration
//!
//! Documents written by older releases are upgraded in place, one version
//! step at a time, before they are deserialized:
//!
//! - `1.0.0` → `1.1.0`: `service.serviceName` / `service.serviceDisplayName`
//!   become `service.name` / `service.displayName`
//! - `1.1.0` → `2.0.0`: the `backendType` discriminator and its sibling
//!   `wsl` / `docker` records are folded into the tagged `backend` record

use log::{debug, info};
use semver::Version;
use serde_json::{Map, Value};

use crate::config::error::LoadError;

/// Schema version written by this build
pub const CURRENT_SCHEMA_VERSION: &str = "2.0.0";

/// Versions this build can read
pub const KNOWN_VERSIONS: &[&str] = &["1.0.0", "1.1.0", "2.0.0"];

/// Version assumed for documents without a `version` field
pub const IMPLICIT_VERSION: &str = "1.0.0";

type Step = fn(&mut Map<String, Value>) -> Result<(), LoadError>;

/// Migration steps keyed by the version they upgrade from
const STEPS: &[(&str, &str, Step)] = &[
    ("1.0.0", "1.1.0", rename_service_identity),
    ("1.1.0", "2.0.0", fold_backend),
];

/// Parse a schema version, accepting the `major.minor` short form
pub fn parse_version(raw: &str) -> Result<Version, LoadError> {
    let raw = raw.trim();
    let normalized = if raw.matches('.').count() == 1 {
        format!("{raw}.0")
    } else {
        raw.to_string()
    };

    Version::parse(&normalized).map_err(|_| unsupported(raw))
}

fn unsupported(found: &str) -> LoadError {
    LoadError::UnsupportedVersion {
        found: found.to_string(),
        supported: KNOWN_VERSIONS.join(", "),
    }
}

/// Whether the document needs to be migrated
pub fn needs_migration(document: &Value) -> bool {
    match document.get("version").and_then(Value::as_str) {
        Some(raw) => parse_version(raw)
            .map(|v| v.to_string() != CURRENT_SCHEMA_VERSION)
            .unwrap_or(true),
        None => true,
    }
}

/// Upgrade a document to the current schema version.
///
/// Returns the version the document was written with.
pub fn migrate(document: &mut Value) -> Result<Version, LoadError> {
    let root = document
        .as_object_mut()
        .ok_or_else(|| LoadError::Migration("document root is not an object".to_string()))?;

    let declared = match root.get("version") {
        Some(Value::String(raw)) => parse_version(raw)?,
        Some(Value::Null) | None => parse_version(IMPLICIT_VERSION)?,
        Some(other) => return Err(unsupported(&other.to_string())),
    };

    let mut current = declared.to_string();
    if !KNOWN_VERSIONS.contains(&current.as_str()) {
        return Err(unsupported(&current));
    }

    while current != CURRENT_SCHEMA_VERSION {
        let (from, to, step) = STEPS
            .iter()
            .find(|(from, _, _)| *from == current)
            .ok_or_else(|| unsupported(&current))?;

        debug!("Migrating configuration schema {} -> {}", from, to);
        step(root)?;
        current = to.to_string();
    }

    root.insert("version".to_string(), Value::String(current));
    if declared.to_string() != CURRENT_SCHEMA_VERSION {
        info!(
            "Migrated configuration from schema {} to {}",
            declared, CURRENT_SCHEMA_VERSION
        );
    }

    Ok(declared)
}

fn rename_key(map: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(value) = map.remove(from) {
        // An explicit new-style key wins over the legacy one.
        map.entry(to.to_string()).or_insert(value);
    }
}

fn rename_service_identity(root: &mut Map<String, Value>) -> Result<(), LoadError> {
    if let Some(service) = root.get_mut("service") {
        let service = service
            .as_object_mut()
            .ok_or_else(|| LoadError::Migration("'service' is not an object".to_string()))?;
        rename_key(service, "serviceName", "name");
        rename_key(service, "serviceDisplayName", "displayName");
    }
    Ok(())
}

fn fold_backend(root: &mut Map<String, Value>) -> Result<(), LoadError> {
    let wsl = root.remove("wsl");
    let docker = root.remove("docker");
    let kind = root.remove("backendType");

    if root.contains_key("backend") {
        return Ok(());
    }

    let kind = match kind {
        Some(Value::String(kind)) => kind.trim().to_lowercase(),
        Some(other) => {
            return Err(LoadError::Migration(format!(
                "'backendType' must be a string, found {}",
                other
            )))
        }
        None => return Err(LoadError::Migration("'backendType' is missing".to_string())),
    };

    let payload = match kind.as_str() {
        "wsl" => wsl,
        "docker" => docker,
        other => {
            return Err(LoadError::Migration(format!(
                "unknown backendType '{}' (expected wsl or docker)",
                other
            )))
        }
    };

    let mut backend = match payload {
        Some(Value::Object(map)) => map,
        Some(Value::Null) | None => Map::new(),
        Some(_) => {
            return Err(LoadError::Migration(format!("'{}' is not an object", kind)));
        }
    };
    backend.insert("type".to_string(), Value::String(kind));
    root.insert("backend".to_string(), Value::Object(backend));

    Ok(())
}
