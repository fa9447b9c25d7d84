//! Registration: which worker version is active, which is waiting, and
//! which version controls the client pages

use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use swstore::{CacheStorage, Request};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::message::{MessageEffect, ReplyPort};
use crate::network::Network;
use crate::router::FetchOutcome;
use crate::worker::{Worker, WorkerState};

/// Which worker a message is posted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageTarget {
    #[default]
    Active,
    Waiting,
}

impl FromStr for MessageTarget {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(MessageTarget::Active),
            "waiting" => Ok(MessageTarget::Waiting),
            _ => Err(format!("Invalid target: {}. Use 'active' or 'waiting'", s)),
        }
    }
}

/// Worker versions registered for one origin
pub struct Registration<N: Network> {
    storage: Arc<CacheStorage>,
    active: RwLock<Option<Arc<Worker<N>>>>,
    waiting: RwLock<Option<Arc<Worker<N>>>>,
    controller: RwLock<Option<String>>,
}

impl<N: Network> Registration<N> {
    pub fn new(storage: Arc<CacheStorage>) -> Self {
        Self {
            storage,
            active: RwLock::new(None),
            waiting: RwLock::new(None),
            controller: RwLock::new(None),
        }
    }

    pub fn storage(&self) -> &Arc<CacheStorage> {
        &self.storage
    }

    pub fn active(&self) -> Option<Arc<Worker<N>>> {
        self.active.read().clone()
    }

    pub fn waiting(&self) -> Option<Arc<Worker<N>>> {
        self.waiting.read().clone()
    }

    /// Version controlling client pages, if any
    pub fn controller(&self) -> Option<String> {
        self.controller.read().clone()
    }

    /// Install `worker`, then activate it or park it as waiting
    ///
    /// A worker that skip-waited (or arrives with nothing active) is activated
    /// at once and the previous active version becomes redundant. If install
    /// fails the previous active version keeps serving.
    pub async fn register(&self, worker: Arc<Worker<N>>) -> Result<WorkerState> {
        worker.install().await?;

        let has_active = self.active.read().is_some();
        if worker.is_skip_waiting() || !has_active {
            self.promote(worker).await
        } else {
            let replaced = self.waiting.write().replace(Arc::clone(&worker));
            if let Some(old) = replaced {
                old.mark_redundant();
            }
            info!(version = %worker.version(), "Worker waiting");
            Ok(worker.state())
        }
    }

    /// Activate `worker` and make it the controller of every client
    ///
    /// Any other worker still waiting is superseded: its partitions were just
    /// deleted, so it must never be activated later.
    async fn promote(&self, worker: Arc<Worker<N>>) -> Result<WorkerState> {
        if worker.state() != WorkerState::Installed {
            return Err(Error::InvalidState(format!(
                "cannot promote worker {} in state {}",
                worker.version(),
                worker.state()
            )));
        }
        worker.activate().await?;

        let previous = self.active.write().replace(Arc::clone(&worker));
        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous, &worker) {
                previous.mark_redundant();
            }
        }

        let stale = self.waiting.write().take();
        if let Some(stale) = stale {
            if !Arc::ptr_eq(&stale, &worker) {
                info!(version = %stale.version(), "Waiting worker superseded");
                stale.mark_redundant();
            }
        }

        self.claim(&worker);
        Ok(worker.state())
    }

    /// Take control of every open client immediately
    fn claim(&self, worker: &Worker<N>) {
        *self.controller.write() = Some(worker.version().to_string());
        info!(version = %worker.version(), "Controlling all clients");
    }

    /// Route a request through the active worker
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        match self.active() {
            Some(worker) => worker.handle_fetch(request).await,
            None => FetchOutcome::Passthrough,
        }
    }

    /// Post a message to the active or waiting worker
    ///
    /// `SKIP_WAITING` sent to the waiting worker promotes it.
    pub async fn post_message(
        &self,
        target: MessageTarget,
        data: &Value,
        port: Option<ReplyPort>,
    ) -> MessageEffect {
        let worker = match target {
            MessageTarget::Active => self.active(),
            MessageTarget::Waiting => self.waiting(),
        };
        let Some(worker) = worker else {
            return MessageEffect::Ignored;
        };

        let effect = worker.handle_message(data, port);
        if effect == MessageEffect::SkipWaiting && target == MessageTarget::Waiting {
            let waiting = self.waiting.write().take();
            if let Some(waiting) = waiting {
                if let Err(e) = self.promote(waiting).await {
                    warn!("Failed to activate waiting worker: {}", e);
                }
            }
        }
        effect
    }
}
