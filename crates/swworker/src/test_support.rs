//! In-memory network for tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use swstore::{Origin, Request, Response, Url};

use crate::network::{Network, NetworkError};

/// URL of `path` on the default worker origin
pub fn page(path: &str) -> Url {
    Url::resolve(&Origin::new("http", "localhost", Some(3000)), path).unwrap()
}

struct Route {
    status: u16,
    content_type: String,
    body: String,
}

/// Serves registered paths; unknown paths get 404
#[derive(Default)]
pub struct MockNetwork {
    routes: Mutex<HashMap<String, Route>>,
    failure: Mutex<Option<NetworkError>>,
    calls: AtomicUsize,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, path: &str, status: u16, content_type: &str, body: &str) {
        self.routes.lock().insert(
            path.to_string(),
            Route {
                status,
                content_type: content_type.to_string(),
                body: body.to_string(),
            },
        );
    }

    /// Serve the default install manifest with small bodies
    pub fn serve_manifest(&self) {
        self.serve("/", 200, "text/html", "<html>root</html>");
        self.serve("/index.html", 200, "text/html", "<html>index</html>");
        self.serve("/style.css", 200, "text/css", "body{margin:0}");
        self.serve("/script.js", 200, "text/javascript", "init();");
        self.serve("/images/favicon.png", 200, "image/png", "PNG");
    }

    pub fn set_online(&self, online: bool) {
        *self.failure.lock() = if online {
            None
        } else {
            Some(NetworkError::Unreachable("offline".to_string()))
        };
    }

    pub fn fail_with(&self, error: NetworkError) {
        *self.failure.lock() = Some(error);
    }

    /// Number of fetches attempted
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self, request: &Request) -> Result<Response, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }

        let routes = self.routes.lock();
        Ok(match routes.get(request.url.path()) {
            Some(route) => Response::new(route.status, reason(route.status))
                .with_header("content-type", route.content_type.clone())
                .with_body(route.body.clone()),
            None => Response::new(404, "Not Found").with_body("not found"),
        })
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "",
    }
}

impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        self.respond(request)
    }
}
