//! Worker configuration
//!
//! Immutable after construction; shared between the router and the
//! lifecycle as `Arc<WorkerConfig>`. Loadable from JSON, every field
//! optional.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use swstore::{Origin, Request, Url};

use crate::error::{Error, Result};

/// Which routing policy the worker applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// Uniform network-first for every same-origin GET
    #[default]
    NetworkFirst,
    /// Cache-first for crawler user agents, network-first for everyone else
    BotAware,
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "network-first" | "network_first" => Ok(PolicyKind::NetworkFirst),
            "bot-aware" | "bot_aware" | "bot" => Ok(PolicyKind::BotAware),
            _ => Err(format!(
                "Invalid policy: {}. Use 'network-first' or 'bot-aware'",
                s
            )),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::NetworkFirst => f.write_str("network-first"),
            PolicyKind::BotAware => f.write_str("bot-aware"),
        }
    }
}

/// Defaults for notifications built from push payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub url: String,
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: "AKO Digital".to_string(),
            body: "Yeni bir bildirim aldınız".to_string(),
            icon: "/images/favicon.png".to_string(),
            badge: "/images/favicon.png".to_string(),
            url: "/".to_string(),
        }
    }
}

/// Static configuration of one worker version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// The only origin whose requests are intercepted
    pub origin: Origin,
    /// Fixed prefix of every partition name
    pub cache_prefix: String,
    /// Version tag; bumping it invalidates every older partition
    pub version: String,
    /// Paths pre-seeded into the static partition at install
    pub manifest: Vec<String>,
    /// Page served to HTML requests when offline with no cache entry
    pub offline_page: String,
    /// Activate right after install instead of waiting for a `SKIP_WAITING` message
    pub skip_waiting: bool,
    pub policy: PolicyKind,
    /// Case-insensitive User-Agent regexes (bot-aware policy only)
    pub bot_patterns: Vec<String>,
    pub notification: NotificationDefaults,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: Origin::new("http", "localhost", Some(3000)),
            cache_prefix: "ako-digital".to_string(),
            version: "v1".to_string(),
            manifest: [
                "/",
                "/index.html",
                "/style.css",
                "/script.js",
                "/images/favicon.png",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            offline_page: "/index.html".to_string(),
            skip_waiting: true,
            policy: PolicyKind::NetworkFirst,
            bot_patterns: [
                "googlebot",
                "bingbot",
                "yandex",
                "baiduspider",
                "slurp",
                "duckduckbot",
                "facebookexternalhit",
                "twitterbot",
                "linkedinbot",
                "whatsapp",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            notification: NotificationDefaults::default(),
        }
    }
}

impl WorkerConfig {
    /// Load and validate a JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: WorkerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the worker cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cache_prefix.is_empty() {
            return Err(Error::Config("cache_prefix must not be empty".to_string()));
        }
        if self.version.is_empty() {
            return Err(Error::Config("version must not be empty".to_string()));
        }
        if let Some(path) = self.manifest.iter().find(|p| !p.starts_with('/')) {
            return Err(Error::Config(format!(
                "manifest path must start with '/': {}",
                path
            )));
        }
        if !self.offline_page.starts_with('/') {
            return Err(Error::Config(format!(
                "offline_page must start with '/': {}",
                self.offline_page
            )));
        }
        Ok(())
    }

    /// Same configuration under a new version tag
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..self.clone()
        }
    }

    /// `<prefix>-<version>-static`
    pub fn static_cache_name(&self) -> String {
        format!("{}-{}-static", self.cache_prefix, self.version)
    }

    /// `<prefix>-<version>-runtime`
    pub fn runtime_cache_name(&self) -> String {
        format!("{}-{}-runtime", self.cache_prefix, self.version)
    }

    /// Whether `name` is one of this version's live partitions
    pub fn is_current_cache(&self, name: &str) -> bool {
        name == self.static_cache_name() || name == self.runtime_cache_name()
    }

    /// GET requests for every manifest path, in manifest order
    pub fn manifest_requests(&self) -> Result<Vec<Request>> {
        self.manifest
            .iter()
            .map(|path| Ok(Request::get(Url::resolve(&self.origin, path)?)))
            .collect()
    }

    /// GET request for the offline fallback page
    pub fn offline_request(&self) -> Result<Request> {
        Ok(Request::get(Url::resolve(&self.origin, &self.offline_page)?))
    }
}
