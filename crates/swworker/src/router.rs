//! Cache Router: executes a routing strategy for one intercepted request
//!
//! Network-first:
//! 1. fetch from the network
//! 2. ok responses are duplicated; the copy goes to the runtime partition in
//!    the background and the original goes back to the caller
//! 3. if the fetch is rejected: cached entry, else the offline page for
//!    HTML requests, else a synthesized 503
//!
//! Any response from the network, whatever its status, is returned as-is.
//! Only a rejected fetch triggers the fallback chain.

use std::sync::Arc;

use swstore::{CacheStorage, Request, Response};
use tracing::{debug, warn};

use crate::config::WorkerConfig;
use crate::network::Network;
use crate::policy::{RoutingPolicy, Strategy};
use crate::stats::RouterStats;
use crate::tasks::BackgroundTasks;

/// Body of the 503 returned when nothing can satisfy a request
pub const OFFLINE_BODY: &str = "Offline";

/// Body of the 503 returned to crawlers when offline
pub const BOT_OFFLINE_BODY: &str = "Offline - Bot Mode";

/// What the host should do with an intercepted request
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; fetch natively without touching the cache
    Passthrough,
    /// Respond with this
    Respond(Response),
}

impl FetchOutcome {
    /// Whether the host should fetch natively
    pub fn is_passthrough(&self) -> bool {
        matches!(self, FetchOutcome::Passthrough)
    }

    /// The response, if the request was intercepted
    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Respond(response) => Some(response),
            FetchOutcome::Passthrough => None,
        }
    }
}

/// Request-to-response mapping over the cache partitions and the network
pub struct Router<N: Network> {
    config: Arc<WorkerConfig>,
    storage: Arc<CacheStorage>,
    network: Arc<N>,
    policy: Arc<dyn RoutingPolicy>,
    stats: Arc<RouterStats>,
    tasks: Arc<BackgroundTasks>,
}

impl<N: Network> Router<N> {
    pub fn new(
        config: Arc<WorkerConfig>,
        storage: Arc<CacheStorage>,
        network: Arc<N>,
        policy: Arc<dyn RoutingPolicy>,
        tasks: Arc<BackgroundTasks>,
    ) -> Self {
        Self {
            config,
            storage,
            network,
            policy,
            stats: Arc::new(RouterStats::new()),
            tasks,
        }
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Route one request
    pub async fn handle(&self, request: &Request) -> FetchOutcome {
        match self.policy.route(request) {
            Strategy::Passthrough => {
                debug!(method = %request.method, url = %request.url, "passthrough");
                self.stats.record_passthrough();
                FetchOutcome::Passthrough
            }
            Strategy::NetworkFirst => FetchOutcome::Respond(self.network_first(request).await),
            Strategy::CacheFirst => FetchOutcome::Respond(self.cache_first(request).await),
        }
    }

    async fn network_first(&self, request: &Request) -> Response {
        match self.network.fetch(request).await {
            Ok(response) => {
                self.stats.record_network();
                if response.ok() && request.is_get() {
                    self.store_in_background(self.config.runtime_cache_name(), request, &response);
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "network failed, trying cache");
                self.offline_fallback(request)
            }
        }
    }

    fn offline_fallback(&self, request: &Request) -> Response {
        if let Some(cached) = self.storage.match_request(request) {
            self.stats.record_cache_fallback();
            return cached;
        }

        if request.accepts_html() {
            match self.config.offline_request() {
                Ok(page) => {
                    if let Some(cached) = self.storage.match_request(&page) {
                        self.stats.record_offline_page();
                        return cached;
                    }
                    debug!(page = %page.url, "offline page not cached");
                }
                Err(e) => warn!("Offline page unusable: {}", e),
            }
        }

        self.stats.record_offline_error();
        Response::offline(OFFLINE_BODY)
    }

    async fn cache_first(&self, request: &Request) -> Response {
        if let Some(cached) = self.storage.match_request(request) {
            self.stats.record_cache_hit();
            return cached;
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                self.stats.record_network();
                let is_html = response
                    .content_type()
                    .is_some_and(|ct| ct.contains("text/html"));
                if response.ok() && request.is_get() && is_html {
                    self.store_in_background(self.config.static_cache_name(), request, &response);
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "network failed in cache-first");
                self.stats.record_offline_error();
                Response::offline(BOT_OFFLINE_BODY)
            }
        }
    }

    /// Duplicate `response` and store the copy without delaying the caller
    fn store_in_background(&self, partition: String, request: &Request, response: &Response) {
        let copy = match response.duplicate() {
            Ok(copy) => copy,
            Err(e) => {
                warn!(url = %request.url, "Cannot duplicate response for cache: {}", e);
                self.stats.record_write_failure();
                return;
            }
        };

        let storage = Arc::clone(&self.storage);
        let stats = Arc::clone(&self.stats);
        let request = request.clone();
        self.tasks.spawn(async move {
            match storage.open(&partition).put(&request, copy) {
                Ok(()) => {
                    debug!(url = %request.url, partition = %partition, "cached");
                    stats.record_write();
                }
                Err(e) => {
                    warn!(url = %request.url, partition = %partition, "Cache write failed: {}", e);
                    stats.record_write_failure();
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyKind;
    use crate::policy;
    use crate::test_support::{page, MockNetwork};
    use swstore::{Method, Url};

    struct Fixture {
        router: Router<MockNetwork>,
        storage: Arc<CacheStorage>,
        network: Arc<MockNetwork>,
        tasks: Arc<BackgroundTasks>,
        config: Arc<WorkerConfig>,
    }

    fn fixture(kind: PolicyKind) -> Fixture {
        let mut config = WorkerConfig::default();
        config.policy = kind;
        let config = Arc::new(config);
        let storage = Arc::new(CacheStorage::new());
        let network = Arc::new(MockNetwork::new());
        let tasks = Arc::new(BackgroundTasks::new());
        let router = Router::new(
            Arc::clone(&config),
            Arc::clone(&storage),
            Arc::clone(&network),
            policy::from_config(&config).unwrap(),
            Arc::clone(&tasks),
        );
        Fixture {
            router,
            storage,
            network,
            tasks,
            config,
        }
    }

    fn get(path: &str) -> Request {
        Request::get(page(path))
    }

    #[tokio::test]
    async fn test_cross_origin_not_intercepted() {
        let f = fixture(PolicyKind::NetworkFirst);
        let req = Request::get(Url::parse("http://cdn.example.com/lib.js").unwrap());

        let outcome = f.router.handle(&req).await;

        assert!(outcome.is_passthrough());
        assert_eq!(f.network.calls(), 0);
        assert!(f.storage.is_empty());
        assert_eq!(f.router.stats().snapshot().passthroughs, 1);
    }

    #[tokio::test]
    async fn test_non_get_not_intercepted() {
        let f = fixture(PolicyKind::NetworkFirst);
        let req = Request::new(Method::Post, page("/contact")).with_body("name=x");

        assert!(f.router.handle(&req).await.is_passthrough());
        assert_eq!(f.network.calls(), 0);
        assert!(f.storage.is_empty());
    }

    #[tokio::test]
    async fn test_network_success_returns_network_response_and_caches() {
        let f = fixture(PolicyKind::NetworkFirst);
        f.network.serve("/style.css", 200, "text/css", "body{}");
        let req = get("/style.css");

        let mut resp = f.router.handle(&req).await.into_response().unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.text().unwrap(), "body{}");

        f.tasks.settle().await;
        let runtime = f.storage.get(&f.config.runtime_cache_name()).unwrap();
        let mut cached = runtime.match_request(&req).unwrap();
        assert_eq!(cached.text().unwrap(), "body{}");
        assert_eq!(f.router.stats().snapshot().cache_writes, 1);
    }

    #[tokio::test]
    async fn test_non_ok_status_returned_but_not_cached() {
        let f = fixture(PolicyKind::NetworkFirst);
        f.storage
            .open("old")
            .put(&get("/missing"), Response::new(200, "OK").with_body("stale"))
            .unwrap();

        let resp = f.router.handle(&get("/missing")).await.into_response().unwrap();
        f.tasks.settle().await;

        // A 404 from the network is a successful fetch: no fallback, no write
        assert_eq!(resp.status, 404);
        assert!(!f.storage.has(&f.config.runtime_cache_name()));
    }

    #[tokio::test]
    async fn test_offline_returns_cached_entry() {
        let f = fixture(PolicyKind::NetworkFirst);
        f.network.serve("/script.js", 200, "text/javascript", "console.log(1)");
        let req = get("/script.js");
        f.router.handle(&req).await;
        f.tasks.settle().await;

        f.network.set_online(false);
        let mut resp = f.router.handle(&req).await.into_response().unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.text().unwrap(), "console.log(1)");
        assert_eq!(f.router.stats().snapshot().cache_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_fallback_independent_of_error_kind() {
        let f = fixture(PolicyKind::NetworkFirst);
        let req = get("/about");
        f.storage
            .open(&f.config.runtime_cache_name())
            .put(&req, Response::new(200, "OK").with_body("about"))
            .unwrap();

        for error in [
            crate::network::NetworkError::Unreachable("offline".into()),
            crate::network::NetworkError::Io("reset".into()),
            crate::network::NetworkError::Protocol("garbage".into()),
        ] {
            f.network.fail_with(error);
            let mut resp = f.router.handle(&req).await.into_response().unwrap();
            assert_eq!(resp.text().unwrap(), "about");
        }
    }

    #[tokio::test]
    async fn test_offline_html_gets_offline_page() {
        let f = fixture(PolicyKind::NetworkFirst);
        f.storage
            .open(&f.config.static_cache_name())
            .put(&get("/index.html"), Response::new(200, "OK").with_body("<h1>home</h1>"))
            .unwrap();
        f.network.set_online(false);

        let req = get("/blog/post-1").with_header("Accept", "text/html,*/*;q=0.8");
        let mut resp = f.router.handle(&req).await.into_response().unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.text().unwrap(), "<h1>home</h1>");
        assert_eq!(f.router.stats().snapshot().offline_pages, 1);
    }

    #[tokio::test]
    async fn test_offline_non_html_gets_503() {
        let f = fixture(PolicyKind::NetworkFirst);
        f.storage
            .open(&f.config.static_cache_name())
            .put(&get("/index.html"), Response::new(200, "OK").with_body("home"))
            .unwrap();
        f.network.set_online(false);

        let req = get("/images/photo.png").with_header("Accept", "image/png");
        let mut resp = f.router.handle(&req).await.into_response().unwrap();

        assert_eq!(resp.status, 503);
        assert_eq!(resp.status_text, "Service Unavailable");
        assert_eq!(resp.content_type(), Some("text/plain"));
        assert_eq!(resp.text().unwrap(), "Offline");
    }

    #[tokio::test]
    async fn test_offline_html_without_offline_page_gets_503() {
        let f = fixture(PolicyKind::NetworkFirst);
        f.network.set_online(false);

        let req = get("/").with_header("Accept", "text/html");
        let resp = f.router.handle(&req).await.into_response().unwrap();

        assert_eq!(resp.status, 503);
    }

    #[tokio::test]
    async fn test_bot_cache_first_hit_skips_network() {
        let f = fixture(PolicyKind::BotAware);
        let req = get("/").with_header("User-Agent", "Googlebot/2.1");
        f.storage
            .open(&f.config.static_cache_name())
            .put(&req, Response::new(200, "OK").with_body("prerendered"))
            .unwrap();

        let mut resp = f.router.handle(&req).await.into_response().unwrap();

        assert_eq!(resp.text().unwrap(), "prerendered");
        assert_eq!(f.network.calls(), 0);
        assert_eq!(f.router.stats().snapshot().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_bot_miss_caches_html_into_static() {
        let f = fixture(PolicyKind::BotAware);
        f.network.serve("/services", 200, "text/html; charset=utf-8", "<p>services</p>");
        f.network.serve("/style.css", 200, "text/css", "body{}");

        let html = get("/services").with_header("User-Agent", "bingbot/2.0");
        let css = get("/style.css").with_header("User-Agent", "bingbot/2.0");
        f.router.handle(&html).await;
        f.router.handle(&css).await;
        f.tasks.settle().await;

        let statics = f.storage.get(&f.config.static_cache_name()).unwrap();
        assert!(statics.match_request(&html).is_some());
        assert!(statics.match_request(&css).is_none());
        assert!(!f.storage.has(&f.config.runtime_cache_name()));
    }

    #[tokio::test]
    async fn test_bot_offline_gets_bot_503() {
        let f = fixture(PolicyKind::BotAware);
        f.network.set_online(false);
        let req = get("/").with_header("User-Agent", "DuckDuckBot/1.1");

        let mut resp = f.router.handle(&req).await.into_response().unwrap();

        assert_eq!(resp.status, 503);
        assert_eq!(resp.text().unwrap(), "Offline - Bot Mode");
    }
}
