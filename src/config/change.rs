//! Change analysis
//!
//! This module decides whether a new configuration can be applied to a
//! running service or needs a restart. The candidate is always validated
//! first; an invalid candidate is rejected whatever changed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::config::document;
use crate::config::error::LoadError;
use crate::config::secrets::SecretResolver;
use crate::config::types::Configuration;
use crate::config::validation::{ConfigValidator, ValidationIssue, ValidationReport, ValidationResult};

/// How a change can be applied, ordered from least to most restrictive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ChangeClassification {
    #[default]
    NoChange,
    HotApplicable,
    RequiresRestart,
    Rejected,
}

impl ChangeClassification {
    /// The more restrictive of two classifications
    pub fn combine(self, other: ChangeClassification) -> ChangeClassification {
        self.max(other)
    }
}

impl fmt::Display for ChangeClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeClassification::NoChange => write!(f, "no change"),
            ChangeClassification::HotApplicable => write!(f, "hot applicable"),
            ChangeClassification::RequiresRestart => write!(f, "requires restart"),
            ChangeClassification::Rejected => write!(f, "rejected"),
        }
    }
}

/// Top level settings group of a document path
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SettingsGroup {
    Backend,
    DataStore,
    Lifecycle,
    Monitoring,
    Performance,
    Advanced,
    Metadata,
}

impl SettingsGroup {
    /// Group a document path belongs to
    pub fn of(path: &str) -> Option<SettingsGroup> {
        match document::root_segment(path) {
            "backend" => Some(SettingsGroup::Backend),
            "redis" => Some(SettingsGroup::DataStore),
            "service" => Some(SettingsGroup::Lifecycle),
            "monitoring" => Some(SettingsGroup::Monitoring),
            "performance" => Some(SettingsGroup::Performance),
            "advanced" => Some(SettingsGroup::Advanced),
            "metadata" | "version" => Some(SettingsGroup::Metadata),
            _ => None,
        }
    }
}

impl fmt::Display for SettingsGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsGroup::Backend => write!(f, "backend"),
            SettingsGroup::DataStore => write!(f, "redis"),
            SettingsGroup::Lifecycle => write!(f, "service"),
            SettingsGroup::Monitoring => write!(f, "monitoring"),
            SettingsGroup::Performance => write!(f, "performance"),
            SettingsGroup::Advanced => write!(f, "advanced"),
            SettingsGroup::Metadata => write!(f, "metadata"),
        }
    }
}

/// Redis settings the running server cannot pick up without a restart
const RESTART_REDIS_FIELDS: &[&str] = &[
    "port",
    "bindAddress",
    "maxMemory",
    "maxMemoryPolicy",
    "enablePersistence",
    "persistenceMode",
    "requirePassword",
    "password",
];

/// Service fields that form the identity registered with Windows
const RESTART_SERVICE_FIELDS: &[&str] = &["name", "displayName", "startType"];

/// Classify a change of a single field
pub fn classify_path(path: &str) -> ChangeClassification {
    let field = |prefix: &str| {
        path.strip_prefix(prefix)
            .map(|rest| rest.split(['.', '[']).next().unwrap_or(rest).to_string())
    };

    match SettingsGroup::of(path) {
        Some(SettingsGroup::Backend) => ChangeClassification::RequiresRestart,
        Some(SettingsGroup::DataStore) => match field("redis.") {
            Some(name) if RESTART_REDIS_FIELDS.contains(&name.as_str()) => {
                ChangeClassification::RequiresRestart
            }
            _ => ChangeClassification::HotApplicable,
        },
        Some(SettingsGroup::Lifecycle) => match field("service.") {
            Some(name) if RESTART_SERVICE_FIELDS.contains(&name.as_str()) => {
                ChangeClassification::RequiresRestart
            }
            _ => ChangeClassification::HotApplicable,
        },
        Some(_) => ChangeClassification::HotApplicable,
        // Unknown top level keys never reach a running service
        None => ChangeClassification::HotApplicable,
    }
}

/// One changed field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub path: String,
    pub group: Option<SettingsGroup>,
    pub classification: ChangeClassification,
}

impl FieldChange {
    fn new(path: String) -> Self {
        Self {
            group: SettingsGroup::of(&path),
            classification: classify_path(&path),
            path,
        }
    }
}

/// Result of comparing a candidate with the running configuration
#[derive(Debug, Clone)]
pub struct ChangeAnalysis {
    /// Most restrictive classification over all changes
    pub classification: ChangeClassification,
    /// Changed fields, sorted by path
    pub changes: Vec<FieldChange>,
    /// Validation report of the candidate
    pub report: ValidationReport,
}

impl ChangeAnalysis {
    /// Classification per changed settings group
    pub fn groups(&self) -> BTreeMap<SettingsGroup, ChangeClassification> {
        let mut groups = BTreeMap::new();
        for change in &self.changes {
            if let Some(group) = change.group {
                let entry = groups.entry(group).or_insert(ChangeClassification::NoChange);
                *entry = entry.combine(change.classification);
            }
        }
        groups
    }

    pub fn changed_paths(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|change| change.path.as_str())
    }

    pub fn is_rejected(&self) -> bool {
        self.classification == ChangeClassification::Rejected
    }

    /// Issues found in the candidate
    pub fn issues(&self) -> &[ValidationIssue] {
        self.report.result.issues()
    }
}

/// Compares configurations and classifies the difference
#[derive(Debug, Clone)]
pub struct ChangeAnalyzer {
    validator: Arc<ConfigValidator>,
    resolver: SecretResolver,
}

impl Default for ChangeAnalyzer {
    fn default() -> Self {
        Self::new(Arc::new(ConfigValidator::default()))
    }
}

impl ChangeAnalyzer {
    pub fn new(validator: Arc<ConfigValidator>) -> Self {
        Self {
            validator,
            resolver: SecretResolver::default(),
        }
    }

    /// Resolve candidate tokens through `resolver`
    pub fn with_resolver(mut self, resolver: SecretResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Validate `candidate` and classify its difference to `previous`.
    ///
    /// Tokens of the candidate that were not resolved yet are resolved first.
    /// A required secret that cannot be resolved rejects the candidate.
    pub fn analyze(
        &self,
        previous: &Configuration,
        candidate: impl Into<Arc<Configuration>>,
    ) -> Result<ChangeAnalysis, LoadError> {
        let candidate = candidate.into();
        let mut found = ValidationResult::success();
        let candidate = match self.resolver.resolve_missing(Configuration::clone(&candidate)) {
            Ok(resolved) => Arc::new(resolved),
            Err(LoadError::Secret(err)) => {
                found.critical(err.field.clone(), err.to_string());
                candidate
            }
            Err(err) => return Err(err),
        };

        let changes = diff(previous, &candidate)?;
        let report = self.validator.report_with(Arc::clone(&candidate), found);

        let classification = if report.is_success() {
            changes
                .iter()
                .fold(ChangeClassification::NoChange, |acc, change| {
                    acc.combine(change.classification)
                })
        } else {
            ChangeClassification::Rejected
        };

        debug!(
            "Change analysis: {} field(s) changed, classification {}",
            changes.len(),
            classification
        );

        Ok(ChangeAnalysis {
            classification,
            changes,
            report,
        })
    }
}

/// Fields that differ between two configurations.
///
/// A rotated secret behind an unchanged token counts as a change of the
/// field holding the token.
pub fn diff(previous: &Configuration, candidate: &Configuration) -> serde_json::Result<Vec<FieldChange>> {
    let before = previous.to_document()?;
    let after = candidate.to_document()?;

    let mut paths = changed_leaves(&before, &after);

    let old_secrets = previous.resolved_values();
    let new_secrets = candidate.resolved_values();
    for (path, secret) in old_secrets.iter() {
        if new_secrets.get(path) != Some(secret) {
            paths.insert(path.to_string());
        }
    }
    for (path, _) in new_secrets.iter() {
        if !old_secrets.contains(path) {
            paths.insert(path.to_string());
        }
    }

    Ok(paths.into_iter().map(FieldChange::new).collect())
}

fn changed_leaves(before: &Value, after: &Value) -> BTreeSet<String> {
    let before: BTreeMap<_, _> = document::leaves(before).into_iter().collect();
    let after: BTreeMap<_, _> = document::leaves(after).into_iter().collect();

    before
        .keys()
        .chain(after.keys())
        .filter(|path| before.get(*path) != after.get(*path))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults;
    use crate::config::secrets::{CredentialStore, ResolvedValues, Secret};
    use crate::config::types::{BackendKind, PASSWORD_PATH};
    use crate::config::validation::Severity;

    fn base() -> Configuration {
        defaults::configuration(BackendKind::Wsl)
    }

    #[test]
    fn test_classify_path_table() {
        use ChangeClassification::*;

        let cases = [
            ("backend.type", RequiresRestart),
            ("backend.portMappings[0]", RequiresRestart),
            ("redis.port", RequiresRestart),
            ("redis.bindAddress", RequiresRestart),
            ("redis.maxMemory", RequiresRestart),
            ("redis.maxMemoryPolicy", RequiresRestart),
            ("redis.persistenceMode", RequiresRestart),
            ("redis.password", RequiresRestart),
            ("redis.logLevel", HotApplicable),
            ("service.name", RequiresRestart),
            ("service.startType", RequiresRestart),
            ("service.description", HotApplicable),
            ("service.recovery.actions[0].delaySeconds", HotApplicable),
            ("monitoring.healthCheck.intervalSeconds", HotApplicable),
            ("performance.slowLog.thresholdMs", HotApplicable),
            ("advanced.environment.FOO", HotApplicable),
            ("metadata.modified", HotApplicable),
            ("version", HotApplicable),
        ];

        for (path, expected) in cases {
            assert_eq!(classify_path(path), expected, "{}", path);
        }
    }

    #[test]
    fn test_identical_is_no_change() {
        let config = base();
        let analysis = ChangeAnalyzer::default().analyze(&config, config.clone()).unwrap();
        assert_eq!(analysis.classification, ChangeClassification::NoChange);
        assert!(analysis.changes.is_empty());
    }

    #[test]
    fn test_log_level_change_is_hot() {
        let previous = base();
        let mut candidate = previous.clone();
        candidate.redis.log_level = "debug".to_string();

        let analysis = ChangeAnalyzer::default().analyze(&previous, candidate).unwrap();
        assert_eq!(analysis.classification, ChangeClassification::HotApplicable);
        assert_eq!(analysis.changed_paths().collect::<Vec<_>>(), vec!["redis.logLevel"]);
    }

    #[test]
    fn test_backend_switch_requires_restart() {
        let previous = base();
        let mut candidate = previous.clone();
        candidate.backend = defaults::backend(BackendKind::Docker);

        let analysis = ChangeAnalyzer::default().analyze(&previous, candidate).unwrap();
        assert_eq!(analysis.classification, ChangeClassification::RequiresRestart);
        assert_eq!(
            analysis.groups().get(&SettingsGroup::Backend),
            Some(&ChangeClassification::RequiresRestart)
        );
    }

    #[test]
    fn test_invalid_candidate_is_rejected() {
        let previous = base();
        let mut candidate = previous.clone();
        candidate.redis.require_password = true;

        let analysis = ChangeAnalyzer::default().analyze(&previous, candidate).unwrap();
        assert!(analysis.is_rejected());
        assert!(analysis.issues().iter().any(|issue| issue.path == PASSWORD_PATH));
    }

    #[test]
    fn test_unresolvable_required_secret_is_rejected() {
        let resolver = SecretResolver::new(
            Arc::new(CredentialStore::new()),
            Arc::new(CredentialStore::new()),
        );
        let analyzer = ChangeAnalyzer::default().with_resolver(resolver);

        let previous = base();
        let mut candidate = previous.clone();
        candidate.redis.require_password = true;
        candidate.redis.password = Some("${env:UNSET_REDIS_PASSWORD}".to_string());

        let analysis = analyzer.analyze(&previous, candidate).unwrap();
        assert!(analysis.is_rejected());
        assert!(analysis
            .issues()
            .iter()
            .any(|issue| issue.path == PASSWORD_PATH && issue.severity == Severity::Critical));
    }

    #[test]
    fn test_rotated_secret_is_detected() {
        let mut previous = base();
        previous.redis.require_password = true;
        previous.redis.password = Some("${env:REDIS_PASSWORD}".to_string());
        let candidate = previous.clone();

        let mut old = ResolvedValues::default();
        old.insert(PASSWORD_PATH, Secret::new("Old-Passw0rd!"));
        let mut new = ResolvedValues::default();
        new.insert(PASSWORD_PATH, Secret::new("New-Passw0rd!"));

        let previous = previous.with_resolved(old);
        let candidate = candidate.with_resolved(new);

        let changes = diff(&previous, &candidate).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, PASSWORD_PATH);
        assert_eq!(changes[0].classification, ChangeClassification::RequiresRestart);
    }

    #[test]
    fn test_cleared_list_is_a_change() {
        let previous = base();
        let mut candidate = previous.clone();
        candidate.service.recovery.actions.clear();

        let changes = diff(&previous, &candidate).unwrap();
        assert!(changes.iter().any(|c| c.path == "service.recovery.actions"));
        assert!(changes.iter().any(|c| c.path == "service.recovery.actions[0].type"));
    }
}
