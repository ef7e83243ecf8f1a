//! UPF Configuration
//!
//! The `upf:` section of the YAML configuration file. Every key is
//! optional; absent keys take the defaults below.
//!
//! ```yaml
//! upf:
//!   pfcp:
//!     server:
//!       - address: 127.0.0.7
//!       - address: ::1
//!         port: 8805
//!     client:
//!       smf:
//!         - address: 127.0.0.4
//!   time:
//!     message:
//!       pfcp:
//!         t3_response: 3000
//!         n3_response: 3
//!   max:
//!     sessions: 1024
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use ogs_metrics::{MetricsConfig, MetricsError};
use ogs_pfcp::types::{PFCP_MAX_SEQUENCE, PFCP_UDP_PORT};
use ogs_pfcp::XactConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::timer::{TimerConfig, UpfTimerConfigs};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot parse {path}: {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid address '{0}'")]
    Address(String),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// `address` + optional `port`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SockEntry {
    pub address: String,
    pub port: Option<u16>,
}

impl SockEntry {
    pub fn new(address: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    pub fn to_socket_addr(&self) -> ConfigResult<SocketAddr> {
        let ip: IpAddr = self
            .address
            .parse()
            .map_err(|_| ConfigError::Address(self.address.clone()))?;
        Ok(SocketAddr::new(ip, self.port.unwrap_or(PFCP_UDP_PORT)))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PfcpClientConfig {
    pub smf: Vec<SockEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PfcpConfig {
    pub server: Vec<SockEntry>,
    pub client: PfcpClientConfig,
}

/// `time.message.pfcp`, durations in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PfcpTimeConfig {
    pub t3_response: u64,
    pub n3_response: u32,
    pub association_interval: u64,
    pub association_max_retries: u32,
    /// Defaults to `t3_response * n3_response`
    pub holding: Option<u64>,
}

impl Default for PfcpTimeConfig {
    fn default() -> Self {
        Self {
            t3_response: 3000,
            n3_response: 3,
            association_interval: 3000,
            association_max_retries: 10,
            holding: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessageTimeConfig {
    pub pfcp: PfcpTimeConfig,
}

/// `time.nf_instance`, milliseconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NfInstanceTimeConfig {
    pub no_heartbeat: u64,
}

impl Default for NfInstanceTimeConfig {
    fn default() -> Self {
        Self {
            no_heartbeat: 10000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    pub message: MessageTimeConfig,
    pub nf_instance: NfInstanceTimeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaxConfig {
    pub sessions: usize,
    pub xacts_per_node: usize,
    pub sequence: u32,
}

impl Default for MaxConfig {
    fn default() -> Self {
        Self {
            sessions: 1024,
            xacts_per_node: 64,
            sequence: PFCP_MAX_SEQUENCE,
        }
    }
}

fn default_queue_size() -> usize {
    1024
}

/// The `upf:` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpfConfig {
    pub pfcp: PfcpConfig,
    pub time: TimeConfig,
    pub max: MaxConfig,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

impl Default for UpfConfig {
    fn default() -> Self {
        Self {
            pfcp: PfcpConfig::default(),
            time: TimeConfig::default(),
            max: MaxConfig::default(),
            queue_size: default_queue_size(),
        }
    }
}

impl UpfConfig {
    /// Load `upf:` and `metrics:` from `path`. A missing or unreadable
    /// file yields the defaults; a file that does not parse is an error.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<(Self, MetricsConfig)> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!(
                    "Could not read config file '{}': {}. Using defaults.",
                    path.display(),
                    e
                );
                return Ok((Self::default(), MetricsConfig::default()));
            }
        };
        log::info!("Loading configuration from: {}", path.display());
        Self::parse(&content).map_err(|e| match e {
            ConfigError::Yaml { source, .. } => ConfigError::Yaml {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn parse(content: &str) -> ConfigResult<(Self, MetricsConfig)> {
        let yaml_error = |source| ConfigError::Yaml {
            path: String::from("<inline>"),
            source,
        };
        let root: serde_yaml::Value = serde_yaml::from_str(content).map_err(yaml_error)?;

        let upf = match root.get("upf") {
            Some(section) => serde_yaml::from_value(section.clone()).map_err(yaml_error)?,
            None => {
                log::warn!("No 'upf' section in config file");
                Self::default()
            }
        };
        let metrics = MetricsConfig::from_yaml(&root)?;

        upf.validate()?;
        Ok((upf, metrics))
    }

    fn validate(&self) -> ConfigResult<()> {
        for entry in self.pfcp.server.iter().chain(&self.pfcp.client.smf) {
            entry.to_socket_addr()?;
        }
        Ok(())
    }

    pub fn pfcp_servers(&self) -> ConfigResult<Vec<SocketAddr>> {
        self.pfcp.server.iter().map(SockEntry::to_socket_addr).collect()
    }

    /// Static peers the UPF associates with on its own
    pub fn smf_peers(&self) -> ConfigResult<Vec<SocketAddr>> {
        self.pfcp.client.smf.iter().map(SockEntry::to_socket_addr).collect()
    }

    pub fn xact_config(&self) -> XactConfig {
        let pfcp = &self.time.message.pfcp;
        let holding = pfcp
            .holding
            .unwrap_or(pfcp.t3_response * u64::from(pfcp.n3_response));
        XactConfig {
            t3_response: Duration::from_millis(pfcp.t3_response),
            n3_response: pfcp.n3_response.max(1),
            holding: Duration::from_millis(holding),
            max_sequence: self.max.sequence.clamp(1, PFCP_MAX_SEQUENCE),
            max_per_node: self.max.xacts_per_node,
        }
    }

    pub fn timer_configs(&self) -> UpfTimerConfigs {
        let pfcp = &self.time.message.pfcp;
        UpfTimerConfigs {
            association: TimerConfig::new_millis(
                pfcp.association_max_retries,
                pfcp.association_interval,
            ),
            no_heartbeat: TimerConfig::new_millis(0, self.time.nf_instance.no_heartbeat),
        }
    }
}
