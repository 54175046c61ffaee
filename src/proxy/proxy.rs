// ────────────────────────────────
// src/proxy/proxy.rs
// Routes each request by key and hands it to the forwarder
// ────────────────────────────────

use super::forwarder::{ForwardError, Forwarder};
use super::pool::BackendPool;
use crate::config::Config;
use crate::load_balancer::{routing_key, Router, Selection};
use crate::metrics::MetricsCollector;
use hyper::{header, Body, Request, Response, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct Proxy {
    router: Router,
    forwarder: Forwarder,
    key_param: String,
    metrics: Option<Arc<MetricsCollector>>,
}

/// What happened to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub backend: Option<String>,
    pub status: StatusCode,
    pub failed_over: bool,
}

impl Proxy {
    pub fn new(config: &Config, pool: Arc<BackendPool>) -> Self {
        Self {
            router: Router::new(pool),
            forwarder: Forwarder::new(config.forward.timeout())
                .with_max_body_bytes(config.forward.max_body_bytes),
            key_param: config.routing.key_param.clone(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn handle(
        &self,
        req: Request<Body>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<Body>, ProxyError> {
        self.dispatch(req, client_addr).await.1
    }

    /// Like [`Proxy::handle`], but always yields a client-facing response.
    pub async fn respond(&self, req: Request<Body>, client_addr: Option<SocketAddr>) -> Response<Body> {
        let start = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_owned();

        let (selection, result) = self.dispatch(req, client_addr).await;
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                match &err {
                    ProxyError::MissingRoutingKey(_) => debug!(%err, "rejecting request"),
                    ProxyError::Forward(forward) => {
                        warn!(error = ?forward, "forward failed");
                        if let Some(metrics) = &self.metrics {
                            metrics.record_forward_failure(forward.reason());
                        }
                    }
                    ProxyError::NoHealthyBackends => warn!(%err, "rejecting request"),
                }
                err.into()
            }
        };

        let outcome = Outcome {
            backend: selection.as_ref().map(|s| s.backend.address.clone()),
            status: response.status(),
            failed_over: selection.as_ref().map_or(false, Selection::failed_over),
        };

        if let Some(metrics) = &self.metrics {
            let backend = outcome.backend.as_deref().unwrap_or("none");
            metrics.record_request(outcome.status.as_u16(), backend, start.elapsed());
            if outcome.failed_over {
                metrics.record_failover();
            }
        }

        info!(
            %method,
            path = %path,
            status = outcome.status.as_u16(),
            backend = outcome.backend.as_deref().unwrap_or("-"),
            failed_over = outcome.failed_over,
            elapsed = ?start.elapsed(),
            "request served"
        );

        response
    }

    async fn dispatch(
        &self,
        req: Request<Body>,
        client_addr: Option<SocketAddr>,
    ) -> (Option<Selection>, Result<Response<Body>, ProxyError>) {
        let key = match routing_key(&req, &self.key_param) {
            Some(key) => key,
            None => {
                return (
                    None,
                    Err(ProxyError::MissingRoutingKey(self.key_param.clone())),
                )
            }
        };

        let selection = match self.router.route(&key) {
            Some(selection) => selection,
            None => return (None, Err(ProxyError::NoHealthyBackends)),
        };

        let result = self
            .forwarder
            .forward(&selection.backend.address, req, client_addr)
            .await;

        (Some(selection), result.map_err(ProxyError::from))
    }
}

// Custom error type for proxy operations
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("missing routing key parameter {0:?}")]
    MissingRoutingKey(String),

    #[error("No healthy backends available")]
    NoHealthyBackends,

    #[error(transparent)]
    Forward(#[from] ForwardError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingRoutingKey(_) => StatusCode::BAD_REQUEST,
            ProxyError::NoHealthyBackends | ProxyError::Forward(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

// Convert ProxyError to Hyper Response for error handling.
// Transport details stay in the logs.
impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let message = match &err {
            ProxyError::MissingRoutingKey(param) => format!("missing {param} parameter"),
            ProxyError::NoHealthyBackends => "no backend available".to_string(),
            ProxyError::Forward(_) => "service unavailable".to_string(),
        };

        let mut response = Response::new(Body::from(message));
        *response.status_mut() = err.status();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}
