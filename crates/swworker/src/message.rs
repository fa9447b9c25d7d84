//! Page-to-worker command messages
//!
//! ```json
//! {"type": "SKIP_WAITING"}   -> no reply
//! {"type": "CLEAR_CACHE"}    -> {"success": true} on the reply port
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::network::Network;
use crate::worker::Worker;

/// Commands a client page can send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    SkipWaiting,
    ClearCache,
}

impl ClientMessage {
    /// Parse a message; anything unrecognized is `None`
    pub fn parse(data: &Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }
}

/// Reply to `CLEAR_CACHE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearCacheReply {
    pub success: bool,
}

/// Reply channel handed over with a message
pub struct ReplyPort(oneshot::Sender<Value>);

impl ReplyPort {
    /// New port and the receiving end the sender listens on
    pub fn channel() -> (ReplyPort, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        (ReplyPort(tx), rx)
    }

    /// Post a reply; a sender that stopped listening is ignored
    pub fn post(self, value: Value) {
        if self.0.send(value).is_err() {
            debug!("Reply port closed before reply");
        }
    }
}

/// What handling a message did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageEffect {
    /// Not a recognized command
    Ignored,
    /// Worker asked to activate without waiting
    SkipWaiting,
    /// Every partition deleted; holds how many there were
    CachesCleared(usize),
}

impl<N: Network> Worker<N> {
    /// Handle a message from a client page
    pub fn handle_message(&self, data: &Value, port: Option<ReplyPort>) -> MessageEffect {
        match ClientMessage::parse(data) {
            None => {
                debug!(message = %data, "Ignoring unrecognized message");
                MessageEffect::Ignored
            }
            Some(ClientMessage::SkipWaiting) => {
                self.skip_waiting();
                MessageEffect::SkipWaiting
            }
            Some(ClientMessage::ClearCache) => {
                let removed = self.storage().clear();
                info!(version = %self.version(), "Cleared {} caches", removed);

                match port {
                    Some(port) => port.post(
                        serde_json::to_value(ClearCacheReply { success: true })
                            .unwrap_or(Value::Null),
                    ),
                    None => debug!("CLEAR_CACHE without reply port"),
                }
                MessageEffect::CachesCleared(removed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::push::NotificationCenter;
    use crate::test_support::MockNetwork;
    use serde_json::json;
    use std::sync::Arc;
    use swstore::CacheStorage;

    fn worker(storage: &Arc<CacheStorage>) -> Worker<MockNetwork> {
        Worker::new(
            WorkerConfig::default(),
            Arc::clone(storage),
            Arc::new(MockNetwork::new()),
            Arc::new(NotificationCenter::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_messages() {
        assert_eq!(
            ClientMessage::parse(&json!({"type": "SKIP_WAITING"})),
            Some(ClientMessage::SkipWaiting)
        );
        assert_eq!(
            ClientMessage::parse(&json!({"type": "CLEAR_CACHE", "extra": 1})),
            Some(ClientMessage::ClearCache)
        );
        assert_eq!(ClientMessage::parse(&json!({"type": "RELOAD"})), None);
        assert_eq!(ClientMessage::parse(&json!("SKIP_WAITING")), None);
        assert_eq!(ClientMessage::parse(&Value::Null), None);
    }

    #[test]
    fn test_skip_waiting() {
        let storage = Arc::new(CacheStorage::new());
        let worker = worker(&storage);

        let effect = worker.handle_message(&json!({"type": "SKIP_WAITING"}), None);

        assert_eq!(effect, MessageEffect::SkipWaiting);
        assert!(worker.is_skip_waiting());
    }

    #[tokio::test]
    async fn test_clear_cache_twice() {
        let storage = Arc::new(CacheStorage::new());
        storage.open("ako-digital-v1-static");
        storage.open("ako-digital-v1-runtime");
        storage.open("other");
        let worker = worker(&storage);

        for expected in [3, 0] {
            let (port, reply) = ReplyPort::channel();
            let effect = worker.handle_message(&json!({"type": "CLEAR_CACHE"}), Some(port));

            assert_eq!(effect, MessageEffect::CachesCleared(expected));
            assert_eq!(reply.await.unwrap(), json!({"success": true}));
            assert!(storage.is_empty());
        }
    }

    #[test]
    fn test_clear_cache_without_port() {
        let storage = Arc::new(CacheStorage::new());
        storage.open("a");
        let worker = worker(&storage);

        let effect = worker.handle_message(&json!({"type": "CLEAR_CACHE"}), None);

        assert_eq!(effect, MessageEffect::CachesCleared(1));
        assert!(storage.is_empty());
    }

    #[test]
    fn test_reply_port_dropped_receiver() {
        let storage = Arc::new(CacheStorage::new());
        let worker = worker(&storage);
        let (port, reply) = ReplyPort::channel();
        drop(reply);

        let effect = worker.handle_message(&json!({"type": "CLEAR_CACHE"}), Some(port));
        assert_eq!(effect, MessageEffect::CachesCleared(0));
    }
}
