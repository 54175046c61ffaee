//! Minimal backend application server.
//!
//! Serves the contract the balancer expects from its backends: a health
//! endpoint, an operator toggle for it, and a keyed data endpoint backed by an
//! in-memory map. Fault injection is configured up front through
//! [`StubConfig`].

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{header, Body, Method, Request, Response, Server, StatusCode};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const HEALTH_FAILURE_ENV: &str = "CONF_HEALTH_FAILURE";
pub const RESPONSE_DELAY_ENV: &str = "CONF_RESPONSE_DELAY_SEC";

#[derive(Debug, Clone, Default)]
pub struct StubConfig {
    /// Start with a failing health endpoint.
    pub health_failure: bool,
    /// Added before answering the data endpoint.
    pub response_delay: Duration,
    pub data: HashMap<String, String>,
}

impl StubConfig {
    /// Reads the fault-injection variables once. Delays outside `1..300`
    /// seconds are ignored.
    pub fn from_env() -> Self {
        let health_failure = std::env::var(HEALTH_FAILURE_ENV)
            .map(|v| v == "true")
            .unwrap_or(false);

        let response_delay = std::env::var(RESPONSE_DELAY_ENV)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| (1..300).contains(secs))
            .map(Duration::from_secs)
            .unwrap_or_default();

        Self {
            health_failure,
            response_delay,
            data: HashMap::new(),
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone)]
pub struct StubBackend {
    healthy: Arc<AtomicBool>,
    served: Arc<AtomicU64>,
    response_delay: Duration,
    data: Arc<HashMap<String, String>>,
}

impl StubBackend {
    pub fn new(config: StubConfig) -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(!config.health_failure)),
            served: Arc::new(AtomicU64::new(0)),
            response_delay: config.response_delay,
            data: Arc::new(config.data),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// Flips the health flag and returns the new value.
    pub fn toggle_health(&self) -> bool {
        !self.healthy.fetch_xor(true, Ordering::SeqCst)
    }

    /// Data requests answered so far.
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        match (&method, path.as_str()) {
            (&Method::GET, "/health") => {
                if self.is_healthy() {
                    text(StatusCode::OK, "OK")
                } else {
                    text(StatusCode::INTERNAL_SERVER_ERROR, "FAILURE")
                }
            }
            (&Method::POST, "/inverse-health") => {
                let healthy = self.toggle_health();
                tracing::info!(healthy, "health flag flipped");
                text(StatusCode::OK, if healthy { "healthy" } else { "unhealthy" })
            }
            (&Method::GET, "/api/v1/some-data") => {
                let key = crate::load_balancer::routing_key(&req, "key");
                self.some_data(key).await
            }
            _ => text(StatusCode::NOT_FOUND, "not found"),
        }
    }

    async fn some_data(&self, key: Option<String>) -> Response<Body> {
        if !self.response_delay.is_zero() {
            tokio::time::sleep(self.response_delay).await;
        }
        self.served.fetch_add(1, Ordering::Relaxed);

        let key = match key {
            Some(key) => key,
            None => return text(StatusCode::BAD_REQUEST, "missing key parameter"),
        };

        let value = match self.data.get(&key) {
            Some(value) => value,
            None => return text(StatusCode::NOT_FOUND, "not found"),
        };

        let body = serde_json::json!({ "key": key, "value": value }).to_string();
        let mut response = Response::new(Body::from(body));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        response
    }

    /// Serves on `addr` until `shutdown` is cancelled. Returns the bound
    /// address, which matters when `addr` uses port 0.
    pub fn spawn(
        self,
        addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> Result<(SocketAddr, JoinHandle<()>)> {
        let make_svc = make_service_fn(move |_conn| {
            let stub = self.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let stub = stub.clone();
                    async move { Ok::<_, Infallible>(stub.handle(req).await) }
                }))
            }
        });

        let server = Server::try_bind(&addr)
            .with_context(|| format!("Failed to bind stub backend on {addr}"))?
            .serve(make_svc);
        let local_addr = server.local_addr();

        let handle = tokio::spawn(async move {
            let graceful = server.with_graceful_shutdown(shutdown.cancelled_owned());
            if let Err(e) = graceful.await {
                tracing::error!("Stub backend error: {}", e);
            }
        });

        Ok((local_addr, handle))
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(response: Response<Body>) -> String {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_follows_flag() {
        let stub = StubBackend::new(StubConfig::default());

        let response = stub.handle(request(Method::GET, "/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "OK");

        let toggled = stub.handle(request(Method::POST, "/inverse-health")).await;
        assert_eq!(toggled.status(), StatusCode::OK);
        assert!(!stub.is_healthy());

        let response = stub.handle(request(Method::GET, "/health")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(response).await, "FAILURE");
    }

    #[tokio::test]
    async fn starts_failing_when_configured() {
        let stub = StubBackend::new(StubConfig {
            health_failure: true,
            ..StubConfig::default()
        });
        assert!(!stub.is_healthy());
        assert!(stub.toggle_health());
        assert!(stub.is_healthy());
    }

    #[tokio::test]
    async fn data_endpoint() {
        let stub = StubBackend::new(StubConfig::default().with_entry("codebryksy", "2024-05-01"));

        let found = stub
            .handle(request(Method::GET, "/api/v1/some-data?key=codebryksy"))
            .await;
        assert_eq!(found.status(), StatusCode::OK);
        assert_eq!(found.headers()[header::CONTENT_TYPE], "application/json");
        let json: serde_json::Value = serde_json::from_str(&body_string(found).await).unwrap();
        assert_eq!(json["key"], "codebryksy");
        assert_eq!(json["value"], "2024-05-01");

        let absent = stub
            .handle(request(Method::GET, "/api/v1/some-data?key=bryksycode"))
            .await;
        assert_eq!(absent.status(), StatusCode::NOT_FOUND);

        let missing = stub.handle(request(Method::GET, "/api/v1/some-data")).await;
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        assert_eq!(stub.served(), 3);
    }

    #[tokio::test]
    async fn delays_data_responses() {
        let stub = StubBackend::new(StubConfig {
            response_delay: Duration::from_millis(100),
            ..StubConfig::default().with_entry("k", "v")
        });

        let start = std::time::Instant::now();
        stub.handle(request(Method::GET, "/api/v1/some-data?key=k")).await;
        assert!(start.elapsed() >= Duration::from_millis(100));

        // health stays fast
        let start = std::time::Instant::now();
        stub.handle(request(Method::GET, "/health")).await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn serves_over_http_and_shuts_down() {
        let shutdown = CancellationToken::new();
        let stub = StubBackend::new(StubConfig::default());
        let (addr, handle) = stub
            .spawn("127.0.0.1:0".parse().unwrap(), shutdown.clone())
            .unwrap();

        let uri = format!("http://{addr}/health").parse().unwrap();
        let response = hyper::Client::new().get(uri).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
