//! # HTTP Server
//!
//! Hyper and Tokio adapter that feeds a shared `Engine`.
//! Implements graceful shutdown with signal handling.
//!
//! ## Key Features
//!
//! - One task per connection, HTTP/1.1 with optional keep-alive
//! - Handler chains run on the blocking pool; they are synchronous
//! - Request bodies are bounded before the chain runs (413 when exceeded)
//! - Graceful shutdown on Ctrl+C, draining live connections

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// HTTP Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Enable keep-alive connections
    pub keep_alive: bool,
    /// How long shutdown waits for live connections (default: 5 seconds)
    pub shutdown_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            keep_alive: true,
            shutdown_timeout: Duration::from_secs(5),
            max_body_size: 1024 * 1024,
        }
    }
}

/// HTTP server driving an `Engine`
pub struct Server {
    config: ServerConfig,
    engine: Arc<Engine>,
}

impl Server {
    /// Create a server for a fully built engine
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self::with_config(engine, ServerConfig::default())
    }

    /// Create a server with explicit settings
    #[must_use]
    pub fn with_config(engine: Engine, config: ServerConfig) -> Self {
        Self {
            config,
            engine: Arc::new(engine),
        }
    }

    /// Bind the server to an address
    #[must_use]
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.address = addr;
        self
    }

    /// Set max request body size
    pub fn set_max_body_size(&mut self, bytes: usize) {
        self.config.max_body_size = bytes;
    }

    /// Active settings
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Shared engine
    #[must_use]
    pub fn engine(&self) -> Arc<Engine> {
        Arc::clone(&self.engine)
    }

    /// Start the server, stopping on Ctrl+C
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` if the address cannot be bound and
    /// `Error::Io` if accepting connections fails.
    pub async fn serve(&self) -> Result<()> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    /// Start the server, stopping when `signal` resolves
    ///
    /// # Errors
    ///
    /// See `serve`.
    pub async fn serve_with_shutdown<S>(&self, signal: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let listener = self.listen()?;
        let addr = listener.local_addr()?;
        info!("Server listening on http://{}", addr);

        let active = Arc::new(AtomicUsize::new(0));
        let max_body_size = self.config.max_body_size;
        let keep_alive = self.config.keep_alive;
        tokio::pin!(signal);

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, remote_addr) = accept_result?;
                    let io = TokioIo::new(stream);
                    let engine = Arc::clone(&self.engine);
                    let active = Arc::clone(&active);

                    active.fetch_add(1, Ordering::Relaxed);
                    tokio::task::spawn(async move {
                        let service = service_fn(move |req| {
                            let engine = Arc::clone(&engine);
                            async move {
                                let method = req.method().clone();
                                let path = req.uri().path().to_string();
                                let version = req.version();
                                let response = handle_request(req, engine, max_body_size).await;
                                info!("    {} - \"{} {} {:?}\" {}",
                                    remote_addr,
                                    method,
                                    path,
                                    version,
                                    response.status()
                                );
                                Ok::<_, hyper::Error>(response)
                            }
                        });

                        if let Err(err) = http1::Builder::new()
                            .keep_alive(keep_alive)
                            .serve_connection(io, service)
                            .await
                        {
                            if err.is_incomplete_message() || err.is_closed() {
                                warn!("Connection from {} closed early: {}", remote_addr, err);
                            } else {
                                error!("Error serving connection: {:?}", err);
                            }
                        }
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                () = &mut signal => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }

        let drain = async {
            while active.load(Ordering::Relaxed) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        if tokio::time::timeout(self.config.shutdown_timeout, drain)
            .await
            .is_err()
        {
            warn!(
                connections = active.load(Ordering::Relaxed),
                "shutdown timeout reached with live connections"
            );
        }
        Ok(())
    }

    fn listen(&self) -> Result<tokio::net::TcpListener> {
        let addr = self.config.address;
        let bind_error = |source| Error::BindError {
            address: addr.to_string(),
            source,
        };

        let socket = if addr.is_ipv4() {
            tokio::net::TcpSocket::new_v4()?
        } else {
            tokio::net::TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        #[cfg(not(windows))]
        {
            socket.set_reuseport(true)?;
        }
        socket.bind(addr).map_err(bind_error)?;
        socket.listen(1024).map_err(bind_error)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Run the engine for one request on the blocking pool
///
/// A task that fails to complete answers 500.
pub async fn dispatch_blocking(engine: Arc<Engine>, request: Request) -> Response {
    match tokio::task::spawn_blocking(move || engine.dispatch(request)).await {
        Ok(response) => response,
        Err(e) => {
            error!("Dispatch task failed: {}", e);
            Response::text("Internal Server Error").with_status(500)
        }
    }
}

async fn handle_request(
    req: hyper::Request<hyper::body::Incoming>,
    engine: Arc<Engine>,
    max_body_size: usize,
) -> hyper::Response<Full<Bytes>> {
    let mut request = match Request::from_hyper_with_limit(req, max_body_size).await {
        Ok(r) => r,
        Err(Error::PayloadTooLarge { limit, actual }) => {
            warn!(limit, actual, "request body too large");
            return Response::text("Payload Too Large")
                .with_status(413)
                .into_hyper();
        }
        Err(e) => {
            error!("Failed to parse request: {}", e);
            return Response::text("Bad Request").with_status(400).into_hyper();
        }
    };

    let request_id = match request.header("x-request-id") {
        Some(id) => id.to_string(),
        None => {
            let id = generate_request_id();
            request.set_header("x-request-id", &id);
            id
        }
    };

    let mut response = dispatch_blocking(engine, request).await;
    if response.header("x-request-id").is_none() {
        response.set_header("x-request-id", &request_id);
    }
    response.into_hyper()
}

static REQUEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", now.as_nanos(), counter)
}
