//! Configuration manager
//!
//! This module provides functionality for managing configuration at runtime:
//! cached loading, explicit reloads and event driven hot reload.
//!
//! A reload reads the file off the async runtime, bounded by the reload
//! timeout, then compares the candidate with the cached configuration:
//!
//! - hot applicable changes are published to the cache at once
//! - changes that need a restart are parked in the pending table until the
//!   supervisor calls [`ConfigManager::commit_pending`]
//! - invalid candidates are rejected and the cached configuration stays
//!
//! Concurrent reloads of the same path are coalesced into one. A change
//! reported while a reload runs makes that reload read the file once more
//! before it finishes, so no write is lost.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, error, info, warn};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::cache::ConfigCache;
use crate::config::change::{ChangeAnalysis, ChangeAnalyzer, ChangeClassification};
use crate::config::error::{LoadError, SaveError};
use crate::config::loader::ConfigLoader;
use crate::config::types::Configuration;
use crate::config::validation::ValidationIssue;
use crate::config::watcher::FileChangeEvent;

/// Result of processing a file change
#[derive(Debug, Clone)]
pub enum ReloadOutcome {
    /// The file holds the configuration already in effect
    Unchanged,
    /// The candidate was published to the cache
    Applied(ChangeAnalysis),
    /// The candidate was stored as pending until the next restart
    RestartRequired(ChangeAnalysis),
    /// The candidate was discarded; the previous configuration stays
    Rejected(Vec<ValidationIssue>),
}

impl ReloadOutcome {
    pub fn classification(&self) -> ChangeClassification {
        match self {
            ReloadOutcome::Unchanged => ChangeClassification::NoChange,
            ReloadOutcome::Applied(analysis) | ReloadOutcome::RestartRequired(analysis) => {
                analysis.classification
            }
            ReloadOutcome::Rejected(_) => ChangeClassification::Rejected,
        }
    }

    /// Issues reported for the candidate
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            ReloadOutcome::Unchanged => &[],
            ReloadOutcome::Applied(analysis) | ReloadOutcome::RestartRequired(analysis) => {
                analysis.issues()
            }
            ReloadOutcome::Rejected(issues) => issues,
        }
    }
}

/// Configuration change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChangeEvent {
    /// A new configuration was published
    Applied { path: PathBuf, changes: Vec<String> },
    /// A new configuration waits for a restart
    RestartRequired { path: PathBuf, changes: Vec<String> },
    /// A pending configuration was published after a restart
    Committed { path: PathBuf },
    /// A candidate was rejected
    Rejected { path: PathBuf, issues: Vec<ValidationIssue> },
    /// The cached configuration was dropped
    Invalidated { path: PathBuf },
}

/// Result of a reload shared by every caller that joined it
pub type ReloadResult = Result<ReloadOutcome, Arc<LoadError>>;
type SharedReload = Shared<BoxFuture<'static, ReloadResult>>;

/// A running reload and whether a caller joined it since its last read
struct InFlight {
    reload: SharedReload,
    rerun: Arc<AtomicBool>,
}

struct ManagerInner {
    loader: ConfigLoader,
    analyzer: ChangeAnalyzer,
    cache: ConfigCache,
    in_flight: DashMap<PathBuf, InFlight>,
    pending: DashMap<PathBuf, Arc<Configuration>>,
    events: broadcast::Sender<ConfigChangeEvent>,
    reload_timeout: Duration,
}

/// Runtime configuration manager
#[derive(Clone)]
pub struct ConfigManager {
    inner: Arc<ManagerInner>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new(ConfigLoader::default())
    }
}

impl ConfigManager {
    /// Create a manager using `loader` for all file access
    pub fn new(loader: ConfigLoader) -> Self {
        let defaults = loader.defaults().clone();
        let (events, _) = broadcast::channel(defaults.event_capacity.max(1));

        info!(
            "Creating configuration manager (reload timeout {:?})",
            defaults.reload_timeout
        );

        Self {
            inner: Arc::new(ManagerInner {
                analyzer: ChangeAnalyzer::new(Arc::clone(loader.validator()))
                    .with_resolver(loader.resolver().clone()),
                loader,
                cache: ConfigCache::new(),
                in_flight: DashMap::new(),
                pending: DashMap::new(),
                events,
                reload_timeout: defaults.reload_timeout,
            }),
        }
    }

    pub fn loader(&self) -> &ConfigLoader {
        &self.inner.loader
    }

    /// Subscribe to change events
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.inner.events.subscribe()
    }

    /// Cached configuration for a path, if any
    pub fn current(&self, path: impl AsRef<Path>) -> Option<Arc<Configuration>> {
        self.inner.cache.get(path.as_ref())
    }

    /// Configuration waiting for a restart, if any
    pub fn pending(&self, path: impl AsRef<Path>) -> Option<Arc<Configuration>> {
        self.inner.pending.get(path.as_ref()).map(|entry| Arc::clone(entry.value()))
    }

    /// Configuration for a path, served from the cache when possible
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Arc<Configuration>, LoadError> {
        let path = path.as_ref();
        if let Some(config) = self.inner.cache.get(path) {
            return Ok(config);
        }
        self.reload(path)
    }

    /// Re-read a configuration from disk, bypassing the cache
    pub fn reload(&self, path: impl AsRef<Path>) -> Result<Arc<Configuration>, LoadError> {
        let path = path.as_ref();
        let config = Arc::new(self.inner.loader.load(path)?);
        self.inner.cache.put(path, Arc::clone(&config));
        self.inner.pending.remove(path);
        Ok(config)
    }

    /// Save a configuration and publish it
    pub fn save(&self, config: &Configuration, path: impl AsRef<Path>) -> Result<(), SaveError> {
        let path = path.as_ref();
        self.inner.loader.save(config, path)?;
        self.inner.cache.put(path, Arc::new(config.clone()));
        self.inner.pending.remove(path);
        Ok(())
    }

    /// Drop the cached configuration for a path
    pub fn invalidate(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if self.inner.cache.invalidate(path).is_some() {
            self.inner.notify(ConfigChangeEvent::Invalidated {
                path: path.to_path_buf(),
            });
        }
    }

    /// Publish the pending configuration, once the managed process restarted
    pub fn commit_pending(&self, path: impl AsRef<Path>) -> Option<Arc<Configuration>> {
        let path = path.as_ref();
        let (_, config) = self.inner.pending.remove(path)?;
        self.inner.cache.put(path, Arc::clone(&config));
        info!("Committed pending configuration for {}", path.display());
        self.inner.notify(ConfigChangeEvent::Committed {
            path: path.to_path_buf(),
        });
        Some(config)
    }

    /// Process a change of the file at `path`.
    ///
    /// A call made while a reload of the same path is running waits for that
    /// reload and shares its outcome; the reload then reads the file again
    /// before finishing. On any error the cached configuration is left
    /// untouched.
    pub async fn handle_change(&self, path: impl AsRef<Path>) -> ReloadResult {
        let path = path.as_ref().to_path_buf();

        let reload = match self.inner.in_flight.entry(path.clone()) {
            Entry::Occupied(entry) => {
                debug!("Joining reload already running for {}", path.display());
                entry.get().rerun.store(true, Ordering::SeqCst);
                entry.get().reload.clone()
            }
            Entry::Vacant(entry) => {
                let inner = Arc::clone(&self.inner);
                let key = path.clone();
                let reload = async move {
                    let (mut text, outcome) = inner.process(&key, None).await;
                    let mut outcome = outcome.unwrap_or(Ok(ReloadOutcome::Unchanged));

                    while inner.take_rerun(&key) {
                        debug!("{} changed during its reload; reading it again", key.display());
                        let (reread, next) = inner.process(&key, text.as_deref()).await;
                        match next {
                            Some(next) => {
                                text = reread;
                                outcome = next;
                            }
                            None => debug!("{} is unchanged since the last read", key.display()),
                        }
                    }
                    outcome
                }
                .boxed()
                .shared();
                entry.insert(InFlight {
                    reload: reload.clone(),
                    rerun: Arc::new(AtomicBool::new(false)),
                });
                reload
            }
        };

        reload.await
    }

    /// Handle watcher events until the channel closes
    pub fn spawn_event_loop(
        &self,
        mut events: mpsc::UnboundedReceiver<FileChangeEvent>,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let manager = manager.clone();
                tokio::spawn(async move {
                    match manager.handle_change(&event.path).await {
                        Ok(outcome) => debug!(
                            "Reload of {} finished: {}",
                            event.path.display(),
                            outcome.classification()
                        ),
                        Err(e) => error!("Reload of {} failed: {}", event.path.display(), e),
                    }
                });
            }
            debug!("Configuration event loop stopped");
        })
    }
}

impl ManagerInner {
    fn notify(&self, event: ConfigChangeEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Finish the reload of `path` unless a caller joined it since its last
    /// read, in which case the flag is cleared and `true` returned.
    fn take_rerun(&self, path: &Path) -> bool {
        let finished = self
            .in_flight
            .remove_if(path, |_, entry| !entry.rerun.swap(false, Ordering::SeqCst))
            .is_some();
        !finished && self.in_flight.contains_key(path)
    }

    /// Read the file once and act on its content.
    ///
    /// Returns the text that was read, if any, and the outcome. The outcome
    /// is `None` when the text equals `last_read`.
    async fn process(&self, path: &Path, last_read: Option<&str>) -> (Option<String>, Option<ReloadResult>) {
        info!("Reloading configuration from {}", path.display());

        let loader = self.loader.clone();
        let read_path = path.to_path_buf();
        let last_read = last_read.map(str::to_string);
        let read = tokio::task::spawn_blocking(move || {
            let text = match loader.read_text(&read_path) {
                Ok(text) => text,
                Err(err) => return (None, Err(err)),
            };
            if last_read.as_deref() == Some(text.as_str()) {
                return (Some(text), Ok(None));
            }
            let candidate = loader.candidate_from_text(&text, &read_path.display().to_string());
            (Some(text), candidate.map(Some))
        });

        let (text, candidate) = match tokio::time::timeout(self.reload_timeout, read).await {
            Err(_) => {
                warn!(
                    "Reading {} timed out after {:?}; keeping the current configuration",
                    path.display(),
                    self.reload_timeout
                );
                let err = LoadError::Timeout {
                    path: path.to_path_buf(),
                    timeout: self.reload_timeout,
                };
                return (None, Some(Err(Arc::new(err))));
            }
            Ok(Err(join)) => return (None, Some(Err(Arc::new(LoadError::Task(join.to_string()))))),
            Ok(Ok(read)) => read,
        };

        let outcome = match candidate {
            Ok(None) => return (text, None),
            Ok(Some(candidate)) => self.apply_candidate(path, candidate).map_err(Arc::new),
            Err(LoadError::Secret(err)) => {
                let issues = vec![ValidationIssue::critical(err.field.clone(), err.to_string())];
                Ok(self.reject(path, issues))
            }
            Err(err) => {
                warn!(
                    "Reload of {} failed: {}; keeping the current configuration",
                    path.display(),
                    err
                );
                Err(Arc::new(err))
            }
        };
        (text, Some(outcome))
    }

    fn apply_candidate(&self, path: &Path, candidate: Configuration) -> Result<ReloadOutcome, LoadError> {
        let current = match self.cache.get(path) {
            Some(current) => current,
            None => {
                // Nothing published yet: the candidate only has to be valid
                let analysis = self.analyzer.analyze(&candidate, candidate.clone())?;
                if analysis.is_rejected() {
                    return Ok(self.reject(path, analysis.issues().to_vec()));
                }
                self.cache.put(path, Arc::clone(&analysis.report.config));
                self.notify(ConfigChangeEvent::Applied {
                    path: path.to_path_buf(),
                    changes: Vec::new(),
                });
                return Ok(ReloadOutcome::Applied(analysis));
            }
        };

        if current.fingerprint()? == candidate.fingerprint()?
            && current.resolved_values() == candidate.resolved_values()
        {
            debug!("Configuration {} is unchanged", path.display());
            return Ok(ReloadOutcome::Unchanged);
        }

        let analysis = self.analyzer.analyze(&current, candidate)?;
        let changes: Vec<String> = analysis.changed_paths().map(str::to_string).collect();

        match analysis.classification {
            ChangeClassification::NoChange => Ok(ReloadOutcome::Unchanged),
            ChangeClassification::HotApplicable => {
                self.cache.put(path, Arc::clone(&analysis.report.config));
                self.pending.remove(path);
                info!(
                    "Applied configuration change to {} ({} field(s))",
                    path.display(),
                    changes.len()
                );
                self.notify(ConfigChangeEvent::Applied {
                    path: path.to_path_buf(),
                    changes,
                });
                Ok(ReloadOutcome::Applied(analysis))
            }
            ChangeClassification::RequiresRestart => {
                self.pending
                    .insert(path.to_path_buf(), Arc::clone(&analysis.report.config));
                warn!(
                    "Configuration change to {} requires a restart: {}",
                    path.display(),
                    changes.join(", ")
                );
                self.notify(ConfigChangeEvent::RestartRequired {
                    path: path.to_path_buf(),
                    changes,
                });
                Ok(ReloadOutcome::RestartRequired(analysis))
            }
            ChangeClassification::Rejected => Ok(self.reject(path, analysis.issues().to_vec())),
        }
    }

    fn reject(&self, path: &Path, issues: Vec<ValidationIssue>) -> ReloadOutcome {
        let blocking = issues.iter().filter(|i| i.severity.is_blocking()).count();
        warn!(
            "Rejected configuration change to {}: {} blocking issue(s); keeping the current configuration",
            path.display(),
            blocking
        );
        for issue in issues.iter().filter(|i| i.severity.is_blocking()) {
            warn!("  {}", issue);
        }

        self.notify(ConfigChangeEvent::Rejected {
            path: path.to_path_buf(),
            issues: issues.clone(),
        });
        ReloadOutcome::Rejected(issues)
    }
}
