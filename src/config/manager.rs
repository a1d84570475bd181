use super::schema::{parse_snapshot, ConfigError};
use super::{ConfigLocator, ConfigSnapshot};
use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

type PublishHook = Box<dyn Fn(&ConfigSnapshot) + Send + Sync>;

/// What a single refresh cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Same path, modification time not advanced.
    Unchanged,
    /// A new snapshot was parsed and published.
    Published,
    /// The file changed but could not be parsed; the old snapshot stays.
    Rejected,
    /// The file could not be inspected (missing, permission denied).
    Unavailable,
}

#[derive(Debug, Default)]
struct WatchState {
    path: Option<PathBuf>,
    modified: Option<SystemTime>,
}

impl WatchState {
    fn is_current(&self, path: &Path, modified: SystemTime) -> bool {
        self.path.as_deref() == Some(path) && self.modified.is_some_and(|seen| modified <= seen)
    }
}

/// Owns the current configuration snapshot.
///
/// Readers call [`current_snapshot`](Self::current_snapshot) without
/// locking. Only [`refresh_once`](Self::refresh_once) writes, and only one
/// refresh runs at a time.
pub struct ConfigManager {
    locator: ConfigLocator,
    current: ArcSwap<ConfigSnapshot>,
    state: Mutex<WatchState>,
    on_publish: Option<PublishHook>,
}

impl ConfigManager {
    pub fn new(locator: ConfigLocator) -> Self {
        Self {
            locator,
            current: ArcSwap::from_pointee(ConfigSnapshot::uninitialized()),
            state: Mutex::new(WatchState::default()),
            on_publish: None,
        }
    }

    /// Registers a callback run after every successful publish, e.g. to
    /// re-apply the configured log level.
    pub fn with_publish_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ConfigSnapshot) + Send + Sync + 'static,
    {
        self.on_publish = Some(Box::new(hook));
        self
    }

    /// The snapshot currently in effect. Never blocks.
    pub fn current_snapshot(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    pub fn is_initialized(&self) -> bool {
        self.current.load().valid
    }

    /// Checks the configuration file once and publishes a new snapshot if
    /// it changed and parses cleanly.
    pub async fn refresh_once(&self) -> RefreshOutcome {
        let mut state = self.state.lock().await;
        let path = self.locator.resolve();

        let metadata = tokio::fs::metadata(&path).await;
        let modified = match metadata.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                warn!("Cannot inspect configuration file {}: {}", path.display(), e);
                return RefreshOutcome::Unavailable;
            }
        };

        if state.is_current(&path, modified) {
            return RefreshOutcome::Unchanged;
        }

        if state.path.as_deref().is_some_and(|seen| seen != path) {
            info!("Configuration file location changed to {}", path.display());
        }

        // Remember what was examined even if it turns out to be broken, so a
        // bad file is reported once rather than on every cycle.
        state.path = Some(path.clone());
        state.modified = Some(modified);

        match Self::load(&path).await {
            Ok(snapshot) => {
                self.publish(snapshot);
                info!(
                    "Configuration has been successfully loaded from {}",
                    path.display()
                );
                RefreshOutcome::Published
            }
            Err(e) => {
                error!(
                    "Configuration file {} rejected, keeping the previous configuration: {}",
                    path.display(),
                    e
                );
                RefreshOutcome::Rejected
            }
        }
    }

    async fn load(path: &Path) -> Result<ConfigSnapshot, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        parse_snapshot(&content)
    }

    fn publish(&self, snapshot: ConfigSnapshot) {
        debug!(
            "Publishing configuration: {} base URL(s), {} attempt(s) x {}ms, worst case {:?}",
            snapshot.base_urls.len(),
            snapshot.connection_attempts,
            snapshot.connection_timeout_ms,
            snapshot.worst_case_latency()
        );
        let snapshot = Arc::new(snapshot);
        self.current.store(snapshot.clone());
        if let Some(hook) = &self.on_publish {
            hook(&snapshot);
        }
    }
}
