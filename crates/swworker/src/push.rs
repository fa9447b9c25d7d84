//! Push notifications
//!
//! A push payload (`{title, body, url}`, all optional) becomes a
//! notification shown through the host. Clicking it closes it and opens
//! or focuses a window at its url.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::NotificationDefaults;
use crate::error::{Error, Result};
use crate::network::Network;
use crate::worker::Worker;

/// Push message data
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
}

impl PushPayload {
    /// Parse push data; no data at all means every field defaults
    pub fn parse(data: Option<&[u8]>) -> Result<Self> {
        match data {
            None => Ok(Self::default()),
            Some(bytes) => {
                serde_json::from_slice(bytes).map_err(|e| Error::InvalidPayload(e.to_string()))
            }
        }
    }
}

/// A system notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// Window opened on click
    pub url: String,
}

impl Notification {
    pub fn from_payload(payload: PushPayload, defaults: &NotificationDefaults) -> Self {
        Self {
            title: payload.title.unwrap_or_else(|| defaults.title.clone()),
            body: payload.body.unwrap_or_else(|| defaults.body.clone()),
            icon: defaults.icon.clone(),
            badge: defaults.badge.clone(),
            url: payload.url.unwrap_or_else(|| defaults.url.clone()),
        }
    }
}

/// Platform capabilities notifications need
pub trait NotificationHost: Send + Sync {
    /// Display a notification, returning its id
    fn show_notification(&self, notification: Notification) -> u64;

    /// Dismiss a notification
    fn close_notification(&self, id: u64);

    /// Open a window at `url`, or focus one already there
    fn open_window(&self, url: &str);
}

impl<N: Network> Worker<N> {
    /// Handle a push message
    pub fn handle_push(&self, data: Option<&[u8]>) -> Result<u64> {
        let payload = PushPayload::parse(data)?;
        let notification = Notification::from_payload(payload, &self.config().notification);
        info!(title = %notification.title, "Showing notification");
        Ok(self.host.show_notification(notification))
    }

    /// Handle a click on a notification this worker showed
    pub fn handle_notification_click(&self, id: u64, notification: &Notification) {
        self.host.close_notification(id);
        self.host.open_window(&notification.url);
    }
}

/// A notification currently on screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShownNotification {
    pub id: u64,
    pub shown_at: DateTime<Utc>,
    #[serde(flatten)]
    pub notification: Notification,
}

/// In-memory notification host: keeps what is on screen and which windows are open
#[derive(Default)]
pub struct NotificationCenter {
    next_id: AtomicU64,
    shown: Mutex<Vec<ShownNotification>>,
    windows: Mutex<Vec<String>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications still on screen, oldest first
    pub fn list(&self) -> Vec<ShownNotification> {
        self.shown.lock().clone()
    }

    pub fn get(&self, id: u64) -> Option<ShownNotification> {
        self.shown.lock().iter().find(|n| n.id == id).cloned()
    }

    /// Open windows, in the order they were opened
    pub fn windows(&self) -> Vec<String> {
        self.windows.lock().clone()
    }
}

impl NotificationHost for NotificationCenter {
    fn show_notification(&self, notification: Notification) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.shown.lock().push(ShownNotification {
            id,
            shown_at: Utc::now(),
            notification,
        });
        id
    }

    fn close_notification(&self, id: u64) {
        self.shown.lock().retain(|n| n.id != id);
    }

    fn open_window(&self, url: &str) {
        let mut windows = self.windows.lock();
        if windows.iter().any(|w| w == url) {
            info!(url, "Focusing window");
        } else {
            info!(url, "Opening window");
            windows.push(url.to_string());
        }
    }
}
