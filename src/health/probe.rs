// src/health/probe.rs
use crate::config::HealthCheckConfig;
use reqwest::{redirect, Client, StatusCode};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use url::Url;

/// Outcome of a single probe against one backend.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub address: String,
    pub healthy: bool,
    pub status: Option<StatusCode>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

/// One-shot liveness check: healthy only on an exact `200 OK` received
/// within the probe timeout.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: Client,
    path: String,
    timeout: Duration,
}

impl HealthProbe {
    pub fn new(path: impl Into<String>, probe_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(probe_timeout)
            .redirect(redirect::Policy::none())
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            path: path.into(),
            timeout: probe_timeout,
        })
    }

    pub fn from_config(config: &HealthCheckConfig) -> Result<Self, reqwest::Error> {
        Self::new(config.path.clone(), config.timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn url_for(&self, address: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!("http://{address}"))?.join(&self.path)
    }

    pub async fn is_healthy(&self, address: &str) -> bool {
        self.check(address).await.healthy
    }

    pub async fn check(&self, address: &str) -> ProbeResult {
        let start = Instant::now();

        let url = match self.url_for(address) {
            Ok(url) => url,
            Err(e) => {
                return ProbeResult {
                    address: address.to_string(),
                    healthy: false,
                    status: None,
                    error: Some(format!("invalid address: {e}")),
                    elapsed: start.elapsed(),
                };
            }
        };

        // The client timeout covers the body; this one also covers DNS.
        let result = timeout(self.timeout, self.client.get(url).send()).await;

        let (healthy, status, error) = match result {
            Ok(Ok(response)) => {
                let status = response.status();
                if status == StatusCode::OK {
                    (true, Some(status), None)
                } else {
                    (false, Some(status), Some(format!("HTTP {status}")))
                }
            }
            Ok(Err(e)) => (false, None, Some(e.to_string())),
            Err(_) => (false, None, Some("probe timed out".to_string())),
        };

        ProbeResult {
            address: address.to_string(),
            healthy,
            status,
            error,
            elapsed: start.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn probe() -> HealthProbe {
        HealthProbe::new("/health", Duration::from_millis(300)).unwrap()
    }

    /// Accepts connections and never answers.
    async fn stalled_backend() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        addr.to_string()
    }

    #[tokio::test]
    async fn healthy_on_200() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_body("OK")
            .create_async()
            .await;

        let result = probe().check(&server.host_with_port()).await;
        assert!(result.healthy);
        assert_eq!(result.status, Some(StatusCode::OK));
        assert!(result.error.is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unhealthy_on_500() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(500)
            .with_body("FAILURE")
            .create_async()
            .await;

        let result = probe().check(&server.host_with_port()).await;
        assert!(!result.healthy);
        assert_eq!(result.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn unhealthy_on_other_success_codes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(204)
            .create_async()
            .await;

        assert!(!probe().is_healthy(&server.host_with_port()).await);
    }

    #[tokio::test]
    async fn redirects_are_not_followed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(302)
            .with_header("location", "/elsewhere")
            .create_async()
            .await;
        server
            .mock("GET", "/elsewhere")
            .with_status(200)
            .create_async()
            .await;

        let result = probe().check(&server.host_with_port()).await;
        assert!(!result.healthy);
        assert_eq!(result.status, Some(StatusCode::FOUND));
    }

    #[tokio::test]
    async fn unhealthy_on_timeout() {
        let addr = stalled_backend().await;
        let start = Instant::now();

        let result = probe().check(&addr).await;
        assert!(!result.healthy);
        assert!(result.status.is_none());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn unhealthy_when_unreachable() {
        assert!(!probe().is_healthy("server:9999").await);

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let closed = listener.local_addr().unwrap().to_string();
        drop(listener);
        assert!(!probe().is_healthy(&closed).await);
    }

    #[test]
    fn builds_health_url() {
        let url = probe().url_for("server1:8080").unwrap();
        assert_eq!(url.as_str(), "http://server1:8080/health");
    }
}
