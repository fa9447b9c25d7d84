//! Background work that must not delay responses (cache writes)

use std::future::Future;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

/// Tracks spawned background tasks so a host can wait for them
#[derive(Default)]
pub struct BackgroundTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` on the current runtime
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Wait until every task spawned so far (and any they spawn) has finished
    pub async fn settle(&self) {
        loop {
            let pending = std::mem::take(&mut *self.handles.lock());
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    warn!("Background task failed: {}", e);
                }
            }
        }
    }

    /// Tasks not yet known to be finished
    pub fn pending(&self) -> usize {
        self.handles.lock().iter().filter(|h| !h.is_finished()).count()
    }
}
