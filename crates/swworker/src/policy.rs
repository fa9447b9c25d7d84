//! Routing policies: which strategy a request is served with
//!
//! The lifecycle and partition machinery never look at the policy; swapping
//! the bot-aware variant in or out only changes what [`RoutingPolicy::route`]
//! returns.

use std::sync::Arc;

use regex::{RegexSet, RegexSetBuilder};
use swstore::{Origin, Request};

use crate::config::{PolicyKind, WorkerConfig};
use crate::error::Result;

/// How a single request is served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Not intercepted; the host fetches natively with no cache interaction
    Passthrough,
    /// Network, then cache, then offline fallbacks
    NetworkFirst,
    /// Cache, then network; HTML responses seed the static partition
    CacheFirst,
}

/// Maps a request to a strategy
pub trait RoutingPolicy: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Strategy for `request`
    fn route(&self, request: &Request) -> Strategy;
}

/// Build the policy named in `config`
pub fn from_config(config: &WorkerConfig) -> Result<Arc<dyn RoutingPolicy>> {
    let origin = config.origin.clone();
    Ok(match config.policy {
        PolicyKind::NetworkFirst => Arc::new(NetworkFirstPolicy::new(origin)),
        PolicyKind::BotAware => Arc::new(BotAwarePolicy::new(origin, &config.bot_patterns)?),
    })
}

/// Network-first for every same-origin GET
pub struct NetworkFirstPolicy {
    origin: Origin,
}

impl NetworkFirstPolicy {
    pub fn new(origin: Origin) -> Self {
        Self { origin }
    }
}

impl RoutingPolicy for NetworkFirstPolicy {
    fn name(&self) -> &'static str {
        "network-first"
    }

    fn route(&self, request: &Request) -> Strategy {
        if request.url.origin() != self.origin || !request.is_get() {
            return Strategy::Passthrough;
        }
        Strategy::NetworkFirst
    }
}

/// Cache-first for crawlers, network-first for everyone else
pub struct BotAwarePolicy {
    origin: Origin,
    bots: RegexSet,
}

impl BotAwarePolicy {
    /// Patterns are matched case-insensitively against `User-Agent`
    pub fn new(origin: Origin, patterns: &[String]) -> Result<Self> {
        let bots = RegexSetBuilder::new(patterns)
            .case_insensitive(true)
            .build()?;
        Ok(Self { origin, bots })
    }

    pub fn is_bot(&self, user_agent: &str) -> bool {
        !user_agent.is_empty() && self.bots.is_match(user_agent)
    }
}

impl RoutingPolicy for BotAwarePolicy {
    fn name(&self) -> &'static str {
        "bot-aware"
    }

    fn route(&self, request: &Request) -> Strategy {
        if request.url.origin() != self.origin || !request.is_get() {
            return Strategy::Passthrough;
        }

        let user_agent = request.headers.get("user-agent").unwrap_or("");
        if self.is_bot(user_agent) {
            Strategy::CacheFirst
        } else {
            Strategy::NetworkFirst
        }
    }
}
