//! Metrics types and configuration

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default Prometheus HTTP port
pub const DEFAULT_PROMETHEUS_HTTP_PORT: u16 = 9090;

/// Default sample refresh interval
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(2);

/// Maximum number of labels per metric
pub const MAX_LABELS: usize = 8;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metric '{0}' already registered with a different type")]
    TypeMismatch(String),
    #[error("metric '{0}' already registered with different label names")]
    LabelMismatch(String),
    #[error("metric '{name}' has {count} labels, at most {MAX_LABELS} allowed")]
    TooManyLabels { name: String, count: usize },
    #[error("invalid metrics configuration: {0}")]
    Config(String),
}

pub type MetricsResult<T> = Result<T, MetricsError>;

/// Metric type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    /// Monotonically increasing value
    Counter,
    /// Value that can go up and down
    Gauge,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawServer {
    address: String,
    port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawMetrics {
    #[serde(default)]
    server: Vec<RawServer>,
    /// Seconds
    interval: Option<u64>,
}

/// The `metrics:` section of a configuration file
///
/// ```yaml
/// metrics:
///   server:
///     - address: 127.0.0.7
///       port: 9090
///   interval: 2
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    pub servers: Vec<SocketAddr>,
    pub update_interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            servers: Vec::new(),
            update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }
}

impl MetricsConfig {
    /// Read the `metrics:` key of a parsed document. A missing key yields
    /// the defaults (no exporter).
    pub fn from_yaml(root: &serde_yaml::Value) -> MetricsResult<Self> {
        let Some(section) = root.get("metrics") else {
            return Ok(Self::default());
        };
        let raw: RawMetrics = serde_yaml::from_value(section.clone())
            .map_err(|e| MetricsError::Config(e.to_string()))?;

        let mut servers = Vec::with_capacity(raw.server.len());
        for server in raw.server {
            let port = server.port.unwrap_or(DEFAULT_PROMETHEUS_HTTP_PORT);
            let ip = server
                .address
                .parse()
                .map_err(|_| MetricsError::Config(format!("bad address '{}'", server.address)))?;
            servers.push(SocketAddr::new(ip, port));
        }

        Ok(MetricsConfig {
            servers,
            update_interval: raw
                .interval
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_UPDATE_INTERVAL),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_without_section() {
        let root: serde_yaml::Value = serde_yaml::from_str("upf: {}").unwrap();
        assert_eq!(MetricsConfig::from_yaml(&root).unwrap(), MetricsConfig::default());
    }

    #[test]
    fn test_config_servers() {
        let root: serde_yaml::Value = serde_yaml::from_str(
            "metrics:\n  server:\n    - address: 127.0.0.7\n      port: 9091\n    - address: ::1\n  interval: 5\n",
        )
        .unwrap();
        let config = MetricsConfig::from_yaml(&root).unwrap();
        assert_eq!(
            config.servers,
            vec![
                "127.0.0.7:9091".parse().unwrap(),
                "[::1]:9090".parse().unwrap()
            ]
        );
        assert_eq!(config.update_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_config_bad_address() {
        let root: serde_yaml::Value =
            serde_yaml::from_str("metrics:\n  server:\n    - address: nowhere\n").unwrap();
        assert!(matches!(
            MetricsConfig::from_yaml(&root),
            Err(MetricsError::Config(_))
        ));
    }
}
