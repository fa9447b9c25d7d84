//! Worker: one version of the cache router plus its lifecycle
//!
//! ```text
//! parsed -> installing -> installed -> activating -> activated -> redundant
//!                |
//!                +-> redundant (install failed)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use swstore::{CacheStorage, Request};
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::network::Network;
use crate::policy;
use crate::push::NotificationHost;
use crate::router::{FetchOutcome, Router};
use crate::stats::RouterStats;
use crate::tasks::BackgroundTasks;

/// Lifecycle state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// A single worker version
pub struct Worker<N: Network> {
    config: Arc<WorkerConfig>,
    storage: Arc<CacheStorage>,
    network: Arc<N>,
    router: Router<N>,
    pub(crate) host: Arc<dyn NotificationHost>,
    tasks: Arc<BackgroundTasks>,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
}

impl<N: Network> Worker<N> {
    /// Create a worker in the `parsed` state
    pub fn new(
        config: WorkerConfig,
        storage: Arc<CacheStorage>,
        network: Arc<N>,
        host: Arc<dyn NotificationHost>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let tasks = Arc::new(BackgroundTasks::new());
        let router = Router::new(
            Arc::clone(&config),
            Arc::clone(&storage),
            Arc::clone(&network),
            policy::from_config(&config)?,
            Arc::clone(&tasks),
        );

        Ok(Self {
            config,
            storage,
            network,
            router,
            host,
            tasks,
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn storage(&self) -> &Arc<CacheStorage> {
        &self.storage
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    pub fn stats(&self) -> &RouterStats {
        self.router.stats()
    }

    pub fn policy_name(&self) -> &'static str {
        self.router.policy_name()
    }

    /// Ask to be activated without waiting for the previous version to go
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    pub fn is_skip_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Pre-seed the static partition with the manifest
    ///
    /// All or nothing: every manifest path must fetch with an ok status
    /// before anything is stored. On failure the worker becomes redundant.
    /// On success the worker skip-waits unless configured not to.
    pub async fn install(&self) -> Result<usize> {
        self.transition(WorkerState::Parsed, WorkerState::Installing)?;
        info!(version = %self.version(), "Installing worker");

        match self.seed_static().await {
            Ok(count) => {
                self.set_state(WorkerState::Installed);
                if self.config.skip_waiting {
                    self.skip_waiting();
                }
                info!(
                    version = %self.version(),
                    cache = %self.config.static_cache_name(),
                    "Installed {} static assets",
                    count
                );
                Ok(count)
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant);
                warn!(version = %self.version(), "Install failed: {}", e);
                Err(e)
            }
        }
    }

    async fn seed_static(&self) -> Result<usize> {
        let requests = self.config.manifest_requests()?;
        let mut fetched = Vec::with_capacity(requests.len());

        for request in requests {
            let path = request.url.path_and_query();
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| Error::InstallFailed {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            if !response.ok() {
                return Err(Error::InstallFailed {
                    path,
                    reason: format!("status {}", response.status),
                });
            }
            fetched.push((request, response));
        }

        let partition = self.storage.open(&self.config.static_cache_name());
        let count = fetched.len();
        for (request, response) in fetched {
            partition.put(&request, response)?;
        }
        Ok(count)
    }

    /// Delete every partition that is not one of this version's two
    ///
    /// Returns the deleted partition names.
    pub async fn activate(&self) -> Result<Vec<String>> {
        self.transition(WorkerState::Installed, WorkerState::Activating)?;

        let mut deleted = Vec::new();
        for name in self.storage.keys() {
            if !self.config.is_current_cache(&name) && self.storage.delete(&name) {
                debug!(cache = %name, "Deleted stale cache");
                deleted.push(name);
            }
        }

        self.set_state(WorkerState::Activated);
        info!(
            version = %self.version(),
            "Activated, removed {} stale caches",
            deleted.len()
        );
        Ok(deleted)
    }

    /// Route an intercepted request; only an activated worker intercepts
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if self.state() != WorkerState::Activated {
            return FetchOutcome::Passthrough;
        }
        self.router.handle(request).await
    }

    /// Wait for background cache writes to finish
    pub async fn settle(&self) {
        self.tasks.settle().await;
    }

    pub fn mark_redundant(&self) {
        self.set_state(WorkerState::Redundant);
        debug!(version = %self.version(), "Worker is redundant");
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> Result<()> {
        let mut state = self.state.write();
        if *state != from {
            return Err(Error::InvalidState(format!(
                "cannot move to {} from {} (expected {})",
                to, *state, from
            )));
        }
        *state = to;
        Ok(())
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.write() = state;
    }
}
