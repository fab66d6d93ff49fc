//! Mock HTTP server for SDK tests.
//!
//! A lightweight server that:
//! - Serves exactly one route
//! - Records all requests received on that route
//! - Answers each of them with a generated body

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info};

use crate::decoder::RawRequest;

/// Response generator function type.
///
/// Runs to completion before any response byte is written.
pub type ResponseGenerator = Arc<dyn Fn(&RawRequest) -> Bytes + Send + Sync>;

type RequestLog = Arc<RwLock<Vec<RawRequest>>>;

/// Check whether a request path is served by a route.
///
/// A route ending in `/` serves its whole subtree; any other route must
/// match exactly.
#[must_use]
pub fn route_matches(route: &str, path: &str) -> bool {
    if route.ends_with('/') {
        path.starts_with(route)
    } else {
        path == route
    }
}

/// Mock HTTP server for testing.
pub struct MockServer {
    address: SocketAddr,
    route: Arc<str>,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    request_log: RequestLog,
}

impl MockServer {
    /// Create a new mock server that will bind to the given address and serve one route.
    pub fn new(address: SocketAddr, route: impl Into<Arc<str>>) -> Self {
        Self {
            address,
            route: route.into(),
            local_addr: None,
            shutdown_tx: None,
            request_log: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Start the mock server.
    ///
    /// Returns the actual address the server is listening on.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn start(&mut self, generator: ResponseGenerator) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(self.address).await?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx.clone());

        let route = Arc::clone(&self.route);
        let request_log = Arc::clone(&self.request_log);
        let mut shutdown_rx = shutdown_tx.subscribe();

        info!(address = %local_addr, route = %route, "mock server listening");

        // Spawn the accept loop
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(address = %local_addr, "mock server stopped");
                        break;
                    }
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer)) => {
                                debug!(peer = %peer, "accepted connection");
                                let route = Arc::clone(&route);
                                let request_log = Arc::clone(&request_log);
                                let generator = Arc::clone(&generator);
                                let shutdown_rx = shutdown_tx.subscribe();

                                tokio::spawn(async move {
                                    Self::handle_connection(
                                        stream,
                                        route,
                                        request_log,
                                        generator,
                                        shutdown_rx,
                                    )
                                    .await;
                                });
                            }
                            Err(e) => {
                                error!(error = %e, "accept error");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(local_addr)
    }

    /// Stop the mock server.
    ///
    /// The listener is released and open connections finish their current
    /// request. Stopping twice is a no-op.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Check if the server has been started and not stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// The bound address, once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// The served route.
    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Get all recorded requests.
    pub async fn get_requests(&self) -> Vec<RawRequest> {
        self.request_log.read().await.clone()
    }

    /// Get the most recent request.
    pub async fn last_request(&self) -> Option<RawRequest> {
        self.request_log.read().await.last().cloned()
    }

    /// Clear the request log.
    pub async fn clear_requests(&self) {
        self.request_log.write().await.clear();
    }

    /// Serve one client connection until it closes or the server stops.
    async fn handle_connection(
        stream: TcpStream,
        route: Arc<str>,
        request_log: RequestLog,
        generator: ResponseGenerator,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let service = service_fn(move |request: Request<Incoming>| {
            let route = Arc::clone(&route);
            let request_log = Arc::clone(&request_log);
            let generator = Arc::clone(&generator);
            async move { Self::serve(request, &route, &request_log, &generator).await }
        });

        let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
        tokio::pin!(connection);

        tokio::select! {
            result = connection.as_mut() => {
                if let Err(e) = result {
                    debug!(error = %e, "connection error");
                }
            }
            _ = shutdown_rx.recv() => {
                connection.as_mut().graceful_shutdown();
                if let Err(e) = connection.await {
                    debug!(error = %e, "connection error during shutdown");
                }
            }
        }
    }

    /// Answer one request.
    async fn serve(
        request: Request<Incoming>,
        route: &str,
        request_log: &RequestLog,
        generator: &ResponseGenerator,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let (parts, body) = request.into_parts();
        let body = body.collect().await?.to_bytes();

        let request = RawRequest {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            content_type: parts
                .headers
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            body,
        };

        if !route_matches(route, &request.path) {
            debug!(path = %request.path, route = %route, "no route for request");
            let body = Full::new(Bytes::from_static(b"404 page not found\n"));
            let mut response = Response::new(body);
            *response.status_mut() = StatusCode::NOT_FOUND;
            return Ok(response);
        }

        debug!(
            method = %request.method,
            path = %request.path,
            body_len = request.body.len(),
            "request received"
        );

        // Record the request
        request_log.write().await.push(request.clone());

        // Generate response
        let body = generator(&request);
        Ok(Response::new(Full::new(body)))
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.stop();
    }
}
