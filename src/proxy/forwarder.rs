// src/proxy/forwarder.rs
use hyper::body::HttpBody;
use hyper::client::HttpConnector;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::http::uri::PathAndQuery;
use hyper::{Body, Client, Request, Response, Uri, Version};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// Response header naming the backend that served the request.
pub const LB_FROM: &str = "lb-from";

pub const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid backend address {address:?}")]
    InvalidAddress {
        address: String,
        #[source]
        source: hyper::http::Error,
    },

    #[error("backend {address} did not answer within {timeout:?}")]
    Timeout { address: String, timeout: Duration },

    #[error("request to backend {address} failed")]
    Transport {
        address: String,
        #[source]
        source: hyper::Error,
    },

    #[error("response from backend {address} exceeds {limit} bytes")]
    BodyTooLarge { address: String, limit: usize },
}

impl ForwardError {
    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ForwardError::InvalidAddress { .. } => "invalid_address",
            ForwardError::Timeout { .. } => "timeout",
            ForwardError::Transport { .. } => "transport",
            ForwardError::BodyTooLarge { .. } => "body_too_large",
        }
    }
}

/// Stateless reverse-proxy call to a single backend.
///
/// The whole exchange, response body included, is bounded by the forward
/// timeout, and the buffered body by `max_body_bytes`. Dropping the returned
/// future (e.g. when the client hangs up and hyper drops the service future)
/// aborts the outbound request.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
    max_body_bytes: usize,
}

impl Forwarder {
    pub fn new(forward_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);

        Self {
            client: Client::builder().build(connector),
            timeout: forward_timeout,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn forward(
        &self,
        address: &str,
        req: Request<Body>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<Body>, ForwardError> {
        let outbound = outbound_request(address, req, client_addr)?;

        let exchange = async {
            let response = self
                .client
                .request(outbound)
                .await
                .map_err(|source| transport(address, source))?;
            let (parts, body) = response.into_parts();
            let bytes = read_body(address, body, self.max_body_bytes).await?;
            Ok::<_, ForwardError>((parts, bytes))
        };

        let (mut parts, bytes) = match timeout(self.timeout, exchange).await {
            Ok(exchanged) => exchanged?,
            Err(_) => {
                return Err(ForwardError::Timeout {
                    address: address.to_string(),
                    timeout: self.timeout,
                })
            }
        };

        strip_hop_by_hop(&mut parts.headers);
        if let Ok(value) = HeaderValue::from_str(address) {
            parts.headers.insert(HeaderName::from_static(LB_FROM), value);
        }

        Ok(Response::from_parts(parts, Body::from(bytes)))
    }
}

fn transport(address: &str, source: hyper::Error) -> ForwardError {
    ForwardError::Transport {
        address: address.to_string(),
        source,
    }
}

/// Buffers the response body, giving up as soon as it grows past `limit`.
async fn read_body(
    address: &str,
    mut body: Body,
    limit: usize,
) -> Result<Vec<u8>, ForwardError> {
    let too_large = || ForwardError::BodyTooLarge {
        address: address.to_string(),
        limit,
    };

    if body.size_hint().lower() > limit as u64 {
        return Err(too_large());
    }

    let mut buffer = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(|source| transport(address, source))?;
        if buffer.len() + chunk.len() > limit {
            return Err(too_large());
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer)
}

fn outbound_request(
    address: &str,
    req: Request<Body>,
    client_addr: Option<SocketAddr>,
) -> Result<Request<Body>, ForwardError> {
    let (mut parts, body) = req.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));

    let invalid = |source: hyper::http::Error| ForwardError::InvalidAddress {
        address: address.to_string(),
        source,
    };

    parts.uri = Uri::builder()
        .scheme("http")
        .authority(address)
        .path_and_query(path_and_query)
        .build()
        .map_err(invalid)?;
    parts.version = Version::HTTP_11;

    strip_hop_by_hop(&mut parts.headers);
    let host = HeaderValue::from_str(address).map_err(|e| invalid(e.into()))?;
    parts.headers.insert(header::HOST, host);

    if let Some(client_addr) = client_addr {
        append_forwarded_for(&mut parts.headers, client_addr);
    }

    Ok(Request::from_parts(parts, body))
}

/// Appends the client IP to the existing chain. Earlier hops are kept
/// byte for byte, even when they are not visible ASCII.
fn append_forwarded_for(headers: &mut HeaderMap, client_addr: SocketAddr) {
    let mut chain: Vec<u8> = Vec::new();
    for value in headers.get_all(X_FORWARDED_FOR) {
        if !chain.is_empty() {
            chain.extend_from_slice(b", ");
        }
        chain.extend_from_slice(value.as_bytes());
    }
    if !chain.is_empty() {
        chain.extend_from_slice(b", ");
    }
    chain.extend_from_slice(client_addr.ip().to_string().as_bytes());

    match HeaderValue::from_bytes(&chain) {
        Ok(value) => {
            headers.insert(X_FORWARDED_FOR, value);
        }
        Err(_) => warn!(client = %client_addr, "x-forwarded-for left unchanged"),
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers listed in Connection are hop-by-hop as well.
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}
