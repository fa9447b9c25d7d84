//! # swworker
//!
//! Offline cache worker for a single origin.
//!
//! ## Architecture
//! - **Policy**: maps each request to a strategy (passthrough, network-first, cache-first)
//! - **Router**: runs the strategy against the network and the cache partitions
//! - **Worker**: one versioned router with its install/activate lifecycle
//! - **Registration**: active and waiting versions, client control
//! - **Messages / Push**: page commands and push notifications
//!
//! Partition names embed the version tag (`<prefix>-<version>-static`,
//! `<prefix>-<version>-runtime`); activating a new version deletes every
//! other partition.

mod config;
mod error;
mod message;
mod network;
mod policy;
mod push;
mod registration;
mod router;
mod stats;
mod tasks;
mod worker;

#[cfg(test)]
mod test_support;

pub use config::{NotificationDefaults, PolicyKind, WorkerConfig};
pub use error::{Error, Result};
pub use message::{ClearCacheReply, ClientMessage, MessageEffect, ReplyPort};
pub use network::{Network, NetworkError};
pub use policy::{BotAwarePolicy, NetworkFirstPolicy, RoutingPolicy, Strategy};
pub use push::{Notification, NotificationCenter, NotificationHost, PushPayload, ShownNotification};
pub use registration::{MessageTarget, Registration};
pub use router::{FetchOutcome, Router, BOT_OFFLINE_BODY, OFFLINE_BODY};
pub use stats::{RouterStats, StatsSnapshot};
pub use tasks::BackgroundTasks;
pub use worker::{Worker, WorkerState};
