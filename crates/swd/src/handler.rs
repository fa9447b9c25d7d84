//! Request handler for the proxy
//!
//! Same-origin requests under `/__sw/` drive the worker (messages, push,
//! updates, introspection); everything else goes through the active worker
//! and, when not intercepted, straight to the network.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use swstore::{EntryInfo, Method, Request, Response, Url};
use swworker::{
    Error as WorkerError, FetchOutcome, MessageEffect, MessageTarget, Network, NotificationCenter,
    NotificationHost, Registration, ReplyPort, StatsSnapshot, Worker, WorkerConfig, WorkerState,
};
use tracing::{info, warn};

use crate::http::ParsedRequest;

/// Path prefix of the control endpoints
const CONTROL_PREFIX: &str = "/__sw/";

#[derive(Serialize)]
struct WorkerInfo {
    version: String,
    state: WorkerState,
    policy: &'static str,
    stats: StatsSnapshot,
    offline_ratio: f64,
}

impl WorkerInfo {
    fn of<N: Network>(worker: &Worker<N>) -> Self {
        Self {
            version: worker.version().to_string(),
            state: worker.state(),
            policy: worker.policy_name(),
            stats: worker.stats().snapshot(),
            offline_ratio: worker.stats().offline_ratio(),
        }
    }
}

pub struct RequestHandler<N: Network> {
    config: WorkerConfig,
    registration: Arc<Registration<N>>,
    network: Arc<N>,
    notifications: Arc<NotificationCenter>,
}

impl<N: Network> RequestHandler<N> {
    pub fn new(
        config: WorkerConfig,
        registration: Arc<Registration<N>>,
        network: Arc<N>,
        notifications: Arc<NotificationCenter>,
    ) -> Self {
        Self {
            config,
            registration,
            network,
            notifications,
        }
    }

    pub fn registration(&self) -> &Arc<Registration<N>> {
        &self.registration
    }

    /// Build a worker for `version` sharing this handler's storage and network
    pub fn new_worker(&self, version: &str) -> swworker::Result<Arc<Worker<N>>> {
        let worker = Worker::new(
            self.config.with_version(version),
            Arc::clone(self.registration.storage()),
            Arc::clone(&self.network),
            Arc::clone(&self.notifications) as Arc<dyn NotificationHost>,
        )?;
        Ok(Arc::new(worker))
    }

    pub async fn handle(&self, parsed: ParsedRequest) -> Response {
        let url = match Url::resolve(&self.config.origin, &parsed.target) {
            Ok(url) => url,
            Err(e) => return text(400, "Bad Request", &e.to_string()),
        };

        let mut request = Request::new(Method::parse(&parsed.method), url);
        request.headers = parsed.headers;
        request.body = parsed.body;

        if request.url.origin() == self.config.origin && request.url.path().starts_with(CONTROL_PREFIX) {
            return self.handle_control(&request).await;
        }

        match self.registration.handle_fetch(&request).await {
            FetchOutcome::Respond(response) => response,
            FetchOutcome::Passthrough => self.fetch_native(&request).await,
        }
    }

    async fn fetch_native(&self, request: &Request) -> Response {
        match self.network.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %request.url, "Upstream fetch failed: {}", e);
                text(502, "Bad Gateway", &e.to_string())
            }
        }
    }

    async fn handle_control(&self, request: &Request) -> Response {
        let path = &request.url.path()[CONTROL_PREFIX.len()..];
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match (&request.method, segments.as_slice()) {
            (Method::Post, ["message"]) => self.handle_message(request).await,
            (Method::Post, ["push"]) => self.handle_push(request),
            (Method::Get, ["notifications"]) => json_response(200, "OK", &self.notifications.list()),
            (Method::Post, ["notifications", id, "click"]) => self.handle_click(id),
            (Method::Get, ["stats"]) => self.handle_stats(),
            (Method::Get, ["caches"]) => self.handle_caches(),
            (Method::Post, ["update"]) => self.handle_update(request).await,
            _ => text(404, "Not Found", "unknown control endpoint"),
        }
    }

    async fn handle_message(&self, request: &Request) -> Response {
        let target = match query_param(&request.url, "target") {
            Some(value) => match value.parse::<MessageTarget>() {
                Ok(target) => target,
                Err(e) => return text(400, "Bad Request", &e),
            },
            None => MessageTarget::Active,
        };
        let data: Value = match serde_json::from_slice(&request.body) {
            Ok(data) => data,
            Err(e) => return text(400, "Bad Request", &format!("invalid JSON: {}", e)),
        };

        let (port, reply) = ReplyPort::channel();
        let effect = self.registration.post_message(target, &data, Some(port)).await;

        match reply.await {
            Ok(value) => json_response(200, "OK", &value),
            Err(_) if effect == MessageEffect::Ignored => {
                text(422, "Unprocessable Entity", "message ignored")
            }
            Err(_) => Response::new(204, "No Content"),
        }
    }

    fn handle_push(&self, request: &Request) -> Response {
        let Some(worker) = self.registration.active() else {
            return text(503, "Service Unavailable", "no active worker");
        };
        let data = (!request.body.is_empty()).then_some(&request.body[..]);

        match worker.handle_push(data) {
            Ok(id) => json_response(201, "Created", &json!({ "id": id })),
            Err(e @ WorkerError::InvalidPayload(_)) => text(400, "Bad Request", &e.to_string()),
            Err(e) => text(500, "Internal Server Error", &e.to_string()),
        }
    }

    fn handle_click(&self, id: &str) -> Response {
        let Ok(id) = id.parse::<u64>() else {
            return text(400, "Bad Request", "invalid notification id");
        };
        let Some(shown) = self.notifications.get(id) else {
            return text(404, "Not Found", "no such notification");
        };
        let Some(worker) = self.registration.active() else {
            return text(503, "Service Unavailable", "no active worker");
        };

        worker.handle_notification_click(id, &shown.notification);
        json_response(200, "OK", &json!({ "opened": shown.notification.url }))
    }

    fn handle_stats(&self) -> Response {
        let body = json!({
            "controller": self.registration.controller(),
            "active": self.registration.active().map(|w| WorkerInfo::of(&*w)),
            "waiting": self.registration.waiting().map(|w| WorkerInfo::of(&*w)),
            "caches": self.registration.storage().keys(),
        });
        json_response(200, "OK", &body)
    }

    fn handle_caches(&self) -> Response {
        let storage = self.registration.storage();
        let listing: BTreeMap<String, Vec<EntryInfo>> = storage
            .keys()
            .into_iter()
            .filter_map(|name| storage.get(&name).map(|p| (name, p.entries())))
            .collect();
        json_response(200, "OK", &listing)
    }

    async fn handle_update(&self, request: &Request) -> Response {
        let Some(version) = query_param(&request.url, "version").filter(|v| !v.is_empty()) else {
            return text(400, "Bad Request", "missing version");
        };
        let worker = match self.new_worker(version) {
            Ok(worker) => worker,
            Err(e) => return text(400, "Bad Request", &e.to_string()),
        };

        match self.registration.register(worker).await {
            Ok(state) => {
                info!(version, %state, "Worker updated");
                json_response(200, "OK", &json!({ "version": version, "state": state }))
            }
            Err(e) => text(502, "Bad Gateway", &e.to_string()),
        }
    }
}

fn query_param<'a>(url: &'a Url, name: &str) -> Option<&'a str> {
    url.query()?
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

fn text(status: u16, reason: &str, body: &str) -> Response {
    Response::new(status, reason)
        .with_header("content-type", "text/plain; charset=utf-8")
        .with_body(body.to_string())
}

fn json_response<T: Serialize + ?Sized>(status: u16, reason: &str, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => Response::new(status, reason)
            .with_header("content-type", "application/json")
            .with_body(body),
        Err(e) => text(500, "Internal Server Error", &e.to_string()),
    }
}
