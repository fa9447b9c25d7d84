//! swd - offline caching proxy hosting the cache worker

mod handler;
mod http;
mod upstream;

use anyhow::{Context, Result};
use bytes::BytesMut;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use swstore::{CacheStorage, Origin, Response};
use swworker::{NotificationCenter, PolicyKind, Registration, WorkerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::handler::RequestHandler;
use crate::http::{encode_response, ParsedRequest};
use crate::upstream::HttpNetwork;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Upstream site origin [default: http://localhost:3000]
    #[arg(short, long)]
    origin: Option<String>,

    /// JSON worker configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cache version of the first worker
    #[arg(long)]
    cache_version: Option<String>,

    /// Routing policy (network-first or bot-aware)
    #[arg(short, long)]
    policy: Option<PolicyKind>,

    /// Seconds between install attempts while the upstream is unreachable
    #[arg(long, default_value_t = 30)]
    install_retry_secs: u64,

    /// Health check mode (for Docker)
    #[arg(long)]
    health: bool,
}

impl Args {
    fn worker_config(&self) -> Result<WorkerConfig> {
        let mut config = match &self.config {
            Some(path) => WorkerConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => WorkerConfig::default(),
        };
        if let Some(origin) = &self.origin {
            config.origin = Origin::parse(origin).context("invalid --origin")?;
        }
        if let Some(version) = &self.cache_version {
            config.version = version.clone();
        }
        if let Some(policy) = &self.policy {
            config.policy = *policy;
        }
        config.validate()?;
        if points_at_bind(&config.origin, &self.bind) {
            anyhow::bail!(
                "origin {} is this proxy's own address ({}); point --origin at the upstream site",
                config.origin,
                self.bind
            );
        }
        Ok(config)
    }
}

/// Whether `origin` would route upstream fetches back into this proxy
fn points_at_bind(origin: &Origin, bind: &str) -> bool {
    let Some((host, port)) = bind.rsplit_once(':') else {
        return false;
    };
    if port.parse::<u16>().ok() != origin.port() {
        return false;
    }

    let host = host.trim_start_matches('[').trim_end_matches(']');
    let local = |h: &str| matches!(h, "localhost" | "127.0.0.1" | "::1" | "0.0.0.0" | "::");
    origin.host().eq_ignore_ascii_case(host) || (local(origin.host()) && local(host))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.health {
        match TcpStream::connect(&args.bind).await {
            Ok(_) => {
                println!("OK");
                std::process::exit(0);
            }
            Err(_) => {
                eprintln!("FAILED");
                std::process::exit(1);
            }
        }
    }

    let config = args.worker_config()?;

    info!("Starting swd v{}", env!("CARGO_PKG_VERSION"));
    info!("Binding to {}", args.bind);
    info!("Upstream origin: {}", config.origin);
    info!("Cache version: {}", config.version);
    info!("Routing policy: {}", config.policy);

    let storage = Arc::new(CacheStorage::new());
    let registration = Arc::new(Registration::new(storage));
    let version = config.version.clone();
    let handler = Arc::new(RequestHandler::new(
        config.clone(),
        registration,
        Arc::new(HttpNetwork::new()),
        Arc::new(NotificationCenter::new()),
    ));

    tokio::spawn(install_with_retry(
        Arc::clone(&handler),
        version,
        Duration::from_secs(args.install_retry_secs.max(1)),
    ));

    let listener = TcpListener::bind(&args.bind).await?;
    info!("Server listening on {}", args.bind);

    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║          swd Offline Proxy Ready!                            ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!("\n📡 PROXY:");
    println!("   Browse:   http://{}/", args.bind);
    println!("   Upstream: {}", config.origin);
    println!("\n💾 CACHES:");
    println!("   Static:   {}", config.static_cache_name());
    println!("   Runtime:  {}", config.runtime_cache_name());
    println!("   Precache: {} paths", config.manifest.len());
    println!("\n🔧 CONTROL (POST unless noted):");
    println!("   /__sw/message[?target=waiting]  {{\"type\":\"CLEAR_CACHE\"}}");
    println!("   /__sw/push                      {{\"title\":\"...\",\"url\":\"/\"}}");
    println!("   /__sw/update?version=v2");
    println!("   /__sw/stats, /__sw/caches, /__sw/notifications (GET)");
    println!("\n🛑 Press Ctrl+C to stop\n");

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let handler = Arc::clone(&handler);

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, handler).await {
                        error!("Error handling client {}: {}", addr, e);
                    }
                    info!("Connection closed: {}", addr);
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

/// Install the first worker, retrying until the precache manifest can be fetched
async fn install_with_retry(
    handler: Arc<RequestHandler<HttpNetwork>>,
    version: String,
    retry: Duration,
) {
    loop {
        let worker = match handler.new_worker(&version) {
            Ok(worker) => worker,
            Err(e) => {
                error!("Cannot build worker {}: {}", version, e);
                return;
            }
        };

        match handler.registration().register(worker).await {
            Ok(state) => {
                info!(version = %version, %state, "Worker registered");
                return;
            }
            Err(e) => {
                warn!("Install failed: {}; retrying in {}s", e, retry.as_secs());
                tokio::time::sleep(retry).await;
            }
        }
    }
}

async fn handle_client(
    mut stream: TcpStream,
    handler: Arc<RequestHandler<HttpNetwork>>,
) -> Result<()> {
    let mut buffer = BytesMut::with_capacity(4096);

    loop {
        let n = stream.read_buf(&mut buffer).await?;

        if n == 0 {
            return Ok(());
        }

        loop {
            match ParsedRequest::parse(&mut buffer) {
                Ok(Some(request)) => {
                    let keep_alive = request.keep_alive;
                    let head_only = request.method.eq_ignore_ascii_case("HEAD");

                    let response = handler.handle(request).await;
                    stream
                        .write_all(&encode_response(response, keep_alive, head_only))
                        .await?;

                    if !keep_alive {
                        return Ok(());
                    }
                }
                Ok(None) => {
                    // Need more data
                    break;
                }
                Err(e) => {
                    warn!("Parse error: {}", e);
                    let response = Response::new(400, "Bad Request")
                        .with_header("content-type", "text/plain; charset=utf-8")
                        .with_body(e);
                    stream
                        .write_all(&encode_response(response, false, false))
                        .await?;
                    return Ok(());
                }
            }
        }
    }
}
