//! Configuration loader
//!
//! Reading, writing and creating configuration documents.
//!
//! Loading runs the full pipeline: parse, migrate the schema, resolve secret
//! tokens and validate. Saving validates first and writes the token form of
//! the document through a temporary file, so a crash never leaves a
//! truncated configuration behind.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};

use crate::config::defaults::{self, ConfigDefaults};
use crate::config::error::{LoadError, SaveError};
use crate::config::migration;
use crate::config::secrets::{ProcessEnvironment, SecretResolver, SecretSource};
use crate::config::source::{ConfigSource, EnvSource};
use crate::config::types::{BackendKind, Configuration};
use crate::config::validation::{ConfigValidator, ValidationReport, ValidationResult};

/// Loads, validates and saves configuration documents
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    resolver: SecretResolver,
    validator: Arc<ConfigValidator>,
    defaults: ConfigDefaults,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(ConfigDefaults::default())
    }
}

impl ConfigLoader {
    pub fn new(defaults: ConfigDefaults) -> Self {
        Self {
            resolver: SecretResolver::default(),
            validator: Arc::new(ConfigValidator::new(&defaults)),
            defaults,
        }
    }

    /// Use a different secret resolver
    pub fn with_resolver(mut self, resolver: SecretResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn validator(&self) -> &Arc<ConfigValidator> {
        &self.validator
    }

    pub fn resolver(&self) -> &SecretResolver {
        &self.resolver
    }

    pub fn defaults(&self) -> &ConfigDefaults {
        &self.defaults
    }

    /// Default configuration file path
    pub fn default_path(&self) -> PathBuf {
        PathBuf::from(&self.defaults.config_file)
    }

    /// Load and validate a configuration file
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Configuration, LoadError> {
        let path = path.as_ref();
        let config = self.read_candidate(path)?;
        self.ensure_valid(&config)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Read, migrate and resolve a configuration file without validating it
    pub fn read_candidate(&self, path: impl AsRef<Path>) -> Result<Configuration, LoadError> {
        let path = path.as_ref();
        let text = self.read_text(path)?;
        self.candidate_from_text(&text, &path.display().to_string())
    }

    /// Raw text of a configuration file
    pub fn read_text(&self, path: impl AsRef<Path>) -> Result<String, LoadError> {
        let path = path.as_ref();
        debug!("Reading configuration from {}", path.display());

        fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => LoadError::NotFound(path.to_path_buf()),
            _ => LoadError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })
    }

    /// Parse, migrate and resolve a document without validating it
    pub fn candidate_from_text(&self, text: &str, origin: &str) -> Result<Configuration, LoadError> {
        let config = self.parse_document(text, origin)?;
        self.resolver.resolve(config)
    }

    /// Parse a JSON document, migrating older schema versions.
    ///
    /// Secret tokens are left unresolved.
    pub fn parse_document(&self, text: &str, origin: &str) -> Result<Configuration, LoadError> {
        let mut document: serde_json::Value =
            serde_json::from_str(text).map_err(|source| LoadError::Parse {
                origin: origin.to_string(),
                source,
            })?;

        migration::migrate(&mut document)?;

        serde_json::from_value(document).map_err(|source| LoadError::Parse {
            origin: origin.to_string(),
            source,
        })
    }

    /// Validate and report
    pub fn validate(&self, config: &Configuration) -> ValidationReport {
        self.validator.validate_with_report(config.clone())
    }

    fn ensure_valid(&self, config: &Configuration) -> Result<(), LoadError> {
        let result = self.validator.validate(config);
        if result.is_success() {
            Ok(())
        } else {
            Err(LoadError::Invalid(result.into_issues()))
        }
    }

    /// Persisted form of a configuration. Secret fields keep their tokens.
    pub fn render(&self, config: &Configuration) -> Result<String, SaveError> {
        Ok(serde_json::to_string_pretty(config)?)
    }

    /// Validate and write a configuration file.
    ///
    /// Tokens are resolved for validation only; a required secret that
    /// cannot be resolved refuses the save.
    pub fn save(&self, config: &Configuration, path: impl AsRef<Path>) -> Result<(), SaveError> {
        let path = path.as_ref();

        let result = match self.resolver.resolve_missing(config.clone()) {
            Ok(resolved) => self.validator.validate(&resolved),
            Err(LoadError::Secret(err)) => {
                let mut found = ValidationResult::success();
                found.critical(err.field.clone(), err.to_string());
                found.combine(self.validator.validate(config))
            }
            Err(LoadError::Document(e)) => return Err(SaveError::Serialize(e)),
            Err(err) => {
                let mut found = ValidationResult::success();
                found.error("document", err.to_string());
                found.combine(self.validator.validate(config))
            }
        };
        if !result.is_success() {
            return Err(SaveError::Invalid(result.into_issues()));
        }

        let text = self.render(config)?;
        let io_error = |source| SaveError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let tmp = temp_path(path);
        fs::write(&tmp, text).map_err(io_error)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_error(e));
        }

        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Default configuration for a backend kind
    pub fn create_default(&self, kind: BackendKind) -> Configuration {
        defaults::configuration(kind)
    }

    /// Defaults overridden by the process environment
    pub fn from_environment(&self) -> Result<Configuration, LoadError> {
        self.from_environment_with(Arc::new(ProcessEnvironment))
    }

    /// Defaults overridden by variables read through `lookup`
    pub fn from_environment_with(&self, lookup: Arc<dyn SecretSource>) -> Result<Configuration, LoadError> {
        let source = EnvSource::with_lookup(&self.defaults.env_prefix, lookup);
        self.from_source(&source)
    }

    /// Apply a source on top of the WSL defaults, resolve and validate
    pub fn from_source(&self, source: &dyn ConfigSource) -> Result<Configuration, LoadError> {
        debug!("Building configuration from source: {}", source.name());
        let config = source.apply(defaults::configuration(BackendKind::Wsl))?;
        let config = self.resolver.resolve_missing(config)?;
        self.ensure_valid(&config)?;
        Ok(config)
    }
}

/// Sibling temporary file used for atomic writes
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| defaults::DEFAULT_CONFIG_FILE.to_string());
    path.with_file_name(format!(".{}.tmp", name))
}
