// src/config/models.rs
use hyper::http::uri::Authority;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Backend addresses as `host:port`. Order defines the hash ring.
    pub backends: Vec<String>,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    #[serde(default)]
    pub forward: ForwardConfig,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_health_path")]
    pub path: String,
    #[serde(default = "default_health_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_health_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForwardConfig {
    #[serde(default = "default_forward_timeout_ms")]
    pub timeout_ms: u64,
    /// Largest response body relayed; bigger ones get a 503.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Query parameter carrying the routing key.
    #[serde(default = "default_key_param")]
    pub key_param: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one backend must be configured")]
    NoBackends,

    #[error("invalid backend address {0:?}: expected host:port")]
    InvalidBackend(String),

    #[error("duplicate backend address {0:?}")]
    DuplicateBackend(String),

    #[error("invalid listen address {0:?}")]
    InvalidListen(String),

    #[error("health check timeout ({timeout_ms}ms) must be non-zero and shorter than the interval ({interval_ms}ms)")]
    HealthTimeout { timeout_ms: u64, interval_ms: u64 },

    #[error("forward timeout ({forward_ms}ms) must be longer than the health check timeout ({health_ms}ms)")]
    ForwardTimeout { forward_ms: u64, health_ms: u64 },

    #[error("routing key parameter must not be empty")]
    EmptyKeyParam,

    #[error("forward max_body_bytes must be non-zero")]
    EmptyBodyLimit,
}

impl Config {
    /// Builds a config with defaults for everything but the backend list.
    pub fn with_backends<I, S>(backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            listen: default_listen(),
            backends: backends.into_iter().map(Into::into).collect(),
            health_check: HealthCheckConfig::default(),
            forward: ForwardConfig::default(),
            routing: RoutingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }

        let mut seen = HashSet::new();
        for address in &self.backends {
            let authority: Authority = address
                .parse()
                .map_err(|_| ConfigError::InvalidBackend(address.clone()))?;
            if authority.port_u16().is_none() || authority.as_str().contains('@') {
                return Err(ConfigError::InvalidBackend(address.clone()));
            }
            if !seen.insert(address.as_str()) {
                return Err(ConfigError::DuplicateBackend(address.clone()));
            }
        }

        self.listen_addr()?;

        let health = &self.health_check;
        if health.timeout_ms == 0 || health.timeout_ms >= health.interval_ms {
            return Err(ConfigError::HealthTimeout {
                timeout_ms: health.timeout_ms,
                interval_ms: health.interval_ms,
            });
        }

        if self.forward.timeout_ms <= health.timeout_ms {
            return Err(ConfigError::ForwardTimeout {
                forward_ms: self.forward.timeout_ms,
                health_ms: health.timeout_ms,
            });
        }

        if self.forward.max_body_bytes == 0 {
            return Err(ConfigError::EmptyBodyLimit);
        }

        if self.routing.key_param.is_empty() {
            return Err(ConfigError::EmptyKeyParam);
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::InvalidListen(self.listen.clone()))
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ForwardConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            path: default_health_path(),
            interval_ms: default_health_interval_ms(),
            timeout_ms: default_health_timeout_ms(),
        }
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_forward_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            key_param: default_key_param(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8090".to_string()
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_health_interval_ms() -> u64 {
    1_000
}

fn default_health_timeout_ms() -> u64 {
    500
}

fn default_forward_timeout_ms() -> u64 {
    2_000
}

fn default_max_body_bytes() -> usize {
    crate::proxy::DEFAULT_MAX_BODY_BYTES
}

fn default_key_param() -> String {
    "key".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::with_backends(["server1:8080", "server2:8080", "server3:8080"]);
        assert!(config.validate().is_ok());
        assert!(config.health_check.timeout() < config.health_check.interval());
        assert!(config.forward.timeout() > config.health_check.timeout());
    }

    #[test]
    fn empty_pool_is_rejected() {
        let config = Config::with_backends(Vec::<String>::new());
        assert!(matches!(config.validate(), Err(ConfigError::NoBackends)));
    }

    #[test]
    fn backend_without_port_is_rejected() {
        let config = Config::with_backends(["server1"]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBackend(addr)) if addr == "server1"
        ));
    }

    #[test]
    fn malformed_backend_is_rejected() {
        let config = Config::with_backends(["http://server1:8080/path"]);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBackend(_))));
    }

    #[test]
    fn duplicate_backend_is_rejected() {
        let config = Config::with_backends(["server1:8080", "server1:8080"]);
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateBackend(_))));
    }

    #[test]
    fn invalid_listen_is_rejected() {
        let mut config = Config::with_backends(["server1:8080"]);
        config.listen = "not-an-address".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidListen(_))));
    }

    #[test]
    fn health_timeout_must_be_shorter_than_interval() {
        let mut config = Config::with_backends(["server1:8080"]);
        config.health_check.timeout_ms = 1_000;
        config.health_check.interval_ms = 1_000;
        assert!(matches!(config.validate(), Err(ConfigError::HealthTimeout { .. })));
    }

    #[test]
    fn forward_timeout_must_exceed_health_timeout() {
        let mut config = Config::with_backends(["server1:8080"]);
        config.forward.timeout_ms = config.health_check.timeout_ms;
        assert!(matches!(config.validate(), Err(ConfigError::ForwardTimeout { .. })));
    }

    #[test]
    fn zero_body_limit_is_rejected() {
        let mut config = Config::with_backends(["server1:8080"]);
        config.forward.max_body_bytes = 0;
        assert!(matches!(config.validate(), Err(ConfigError::EmptyBodyLimit)));
    }

    #[test]
    fn parses_yaml_with_defaults() {
        let yaml = r#"
listen: "127.0.0.1:9000"
backends:
  - server1:8080
  - server2:8080
health_check:
  interval_ms: 2000
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.backends, vec!["server1:8080", "server2:8080"]);
        assert_eq!(config.health_check.interval_ms, 2_000);
        assert_eq!(config.health_check.timeout_ms, 500);
        assert_eq!(config.health_check.path, "/health");
        assert_eq!(config.routing.key_param, "key");
        assert_eq!(config.forward.max_body_bytes, 8 * 1024 * 1024);
        assert!(!config.metrics.enabled);
        assert!(config.validate().is_ok());
    }
}
