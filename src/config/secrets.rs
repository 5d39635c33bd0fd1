//! Secret resolution
//!
//! This module resolves `${source:name}` tokens found in string fields of a
//! configuration. Resolved values are stored next to the configuration, the
//! document itself keeps the tokens so that saving never persists a secret.
//!
//! Supported sources:
//! - `env`: process environment
//! - `cred`: credential store

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::document;
use crate::config::error::{LoadError, SecretUnavailable};
use crate::config::types::{Configuration, PASSWORD_PATH};

/// Source name for process environment lookups
pub const ENV_SOURCE: &str = "env";

/// Source name for credential store lookups
pub const CRED_SOURCE: &str = "cred";

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z][A-Za-z0-9_]*):([^}]+)\}").expect("invalid regex"));

/// Whether the value contains at least one secret token
pub fn contains_token(value: &str) -> bool {
    TOKEN.is_match(value)
}

/// Named store that secrets can be read from
#[cfg_attr(test, mockall::automock)]
pub trait SecretSource: Send + Sync {
    /// Look up a secret by name
    fn get(&self, name: &str) -> Option<String>;
}

/// Secret source backed by the process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl SecretSource for ProcessEnvironment {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// In-memory credential store.
///
/// Stands in for the operating system credential manager; platform backed
/// stores implement [`SecretSource`] the same way.
#[derive(Default, Clone)]
pub struct CredentialStore {
    entries: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a credential
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    /// Builder style variant of [`insert`](Self::insert)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("CredentialStore").field("names", &names).finish()
    }
}

impl SecretSource for CredentialStore {
    fn get(&self, name: &str) -> Option<String> {
        self.entries.get(name).cloned()
    }
}

/// A resolved secret value.
///
/// Deliberately has no `Display`; `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the plain value
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Compare against a plain value
    pub fn matches(&self, other: &str) -> bool {
        self.0 == other
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Resolved values keyed by the document path of the field holding the token
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedValues {
    values: BTreeMap<String, Secret>,
}

impl ResolvedValues {
    pub fn get(&self, path: &str) -> Option<&Secret> {
        self.values.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.values.contains_key(path)
    }

    pub fn insert(&mut self, path: impl Into<String>, secret: Secret) {
        self.values.insert(path.into(), secret);
    }

    pub fn remove(&mut self, path: &str) -> Option<Secret> {
        self.values.remove(path)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Secret)> {
        self.values.iter().map(|(path, secret)| (path.as_str(), secret))
    }
}

/// Resolves secret tokens against the configured sources
#[derive(Clone)]
pub struct SecretResolver {
    env: Arc<dyn SecretSource>,
    cred: Arc<dyn SecretSource>,
}

impl Default for SecretResolver {
    fn default() -> Self {
        Self::new(Arc::new(ProcessEnvironment), Arc::new(CredentialStore::new()))
    }
}

impl fmt::Debug for SecretResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretResolver").finish_non_exhaustive()
    }
}

impl SecretResolver {
    pub fn new(env: Arc<dyn SecretSource>, cred: Arc<dyn SecretSource>) -> Self {
        Self { env, cred }
    }

    /// Replace the credential store
    pub fn with_credentials(mut self, cred: Arc<dyn SecretSource>) -> Self {
        self.cred = cred;
        self
    }

    fn source(&self, name: &str) -> Option<&dyn SecretSource> {
        match name {
            ENV_SOURCE => Some(self.env.as_ref()),
            CRED_SOURCE => Some(self.cred.as_ref()),
            _ => None,
        }
    }

    /// Resolve every token of a single field value.
    ///
    /// Fails on the first token that cannot be resolved.
    pub fn resolve_value(&self, field: &str, raw: &str) -> Result<Secret, SecretUnavailable> {
        let mut missing = None;
        let resolved = TOKEN.replace_all(raw, |caps: &Captures<'_>| {
            let source = &caps[1];
            let identifier = caps[2].trim();
            match self.source(source).and_then(|s| s.get(identifier)) {
                Some(value) => value,
                None => {
                    if missing.is_none() {
                        missing = Some(SecretUnavailable {
                            secret_source: source.to_string(),
                            identifier: identifier.to_string(),
                            field: field.to_string(),
                        });
                    }
                    String::new()
                }
            }
        });

        match missing {
            Some(err) => Err(err),
            None => Ok(Secret::new(resolved.into_owned())),
        }
    }

    /// Resolve all tokens of a configuration.
    ///
    /// A missing secret fails the whole resolution only when the field is
    /// required; otherwise the field resolves to an empty value.
    pub fn resolve(&self, config: Configuration) -> Result<Configuration, LoadError> {
        self.resolve_missing(config.with_resolved(ResolvedValues::default()))
    }

    /// Resolve the tokens that have no resolved value yet.
    ///
    /// Values already attached to the configuration are kept and not looked
    /// up again.
    pub fn resolve_missing(&self, config: Configuration) -> Result<Configuration, LoadError> {
        let document = config.to_document()?;
        let mut resolved = config.resolved_values().clone();
        let mut added = 0;

        for (path, raw) in document::string_leaves(&document) {
            if !contains_token(raw) || resolved.contains(&path) {
                continue;
            }
            added += 1;

            match self.resolve_value(&path, raw) {
                Ok(secret) => {
                    debug!("Resolved secret token in {}", path);
                    resolved.insert(path, secret);
                }
                Err(err) if is_required(&config, &path) => return Err(err.into()),
                Err(err) => {
                    warn!("{}; using an empty value", err);
                    resolved.insert(path, Secret::new(""));
                }
            }
        }

        if added == 0 {
            return Ok(config);
        }
        Ok(config.with_resolved(resolved))
    }
}

/// A field is required when it is the authentication secret and
/// authentication is enabled.
fn is_required(config: &Configuration, path: &str) -> bool {
    path == PASSWORD_PATH && config.redis.require_password
}
