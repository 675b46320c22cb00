//! Gateway configuration.
//!
//! Configuration is a YAML file; every field has a default so an empty file
//! describes the deployed two-channel gateway that forwards to the
//! spreadsheet collector on localhost.
//!
//! ```yaml
//! listen: 127.0.0.1:50812
//! poll_timeout_ms: 3000
//! protocol_version: 18
//! max_channels: 2
//! max_devices: 100
//! codec:
//!   byte_order: big
//!   numeric: fixed_point
//! routes:
//!   - channel: 0
//!     sink: { kind: udp, destination: 127.0.0.1:50910, schema: routed }
//!   - channel: 1
//!     sink: { kind: stdout, schema: plain }
//! ```

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hivegate_packet::{
    CodecConfig, FrameLimits, DEFAULT_MAX_CHANNELS, DEFAULT_MAX_DEVICES, PROTOCOL_VERSION,
};
use hivegate_sink::{
    Renderer, Schema, Sink, UdpSink, WriterSink, DEFAULT_COLLECTOR_ADDR, MAX_LINE_LENGTH,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default inbound address.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:50812";

/// Default readiness-wait timeout in milliseconds.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 3000;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML for this schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Downstream sink of one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum SinkConfig {
    /// NUL-terminated lines over UDP.
    Udp {
        /// Collector address.
        destination: SocketAddr,
        /// Line schema.
        #[serde(default = "routed_schema")]
        schema: Schema,
        /// Send the collector's `close` command on shutdown.
        #[serde(default)]
        send_close_on_shutdown: bool,
        /// Name for logs and metrics.
        #[serde(default)]
        name: Option<String>,
    },
    /// Newline-terminated lines on standard output.
    Stdout {
        /// Line schema.
        #[serde(default)]
        schema: Schema,
    },
}

fn routed_schema() -> Schema {
    Schema::Routed
}

impl SinkConfig {
    /// The spreadsheet collector on localhost.
    pub fn default_collector() -> Self {
        SinkConfig::Udp {
            destination: default_collector_addr(),
            schema: Schema::Routed,
            send_close_on_shutdown: false,
            name: None,
        }
    }
}

fn default_collector_addr() -> SocketAddr {
    DEFAULT_COLLECTOR_ADDR
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 50910)))
}

/// One inbound channel and the sink its records go to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// Inbound channel id.
    pub channel: u8,
    /// Where the channel's records go.
    pub sink: SinkConfig,
}

/// Complete gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Inbound UDP address.
    pub listen: SocketAddr,
    /// Readiness-wait timeout; bounds how long a shutdown request waits.
    pub poll_timeout_ms: u64,
    /// Expected protocol version byte.
    pub protocol_version: u8,
    /// Number of inbound channels.
    pub max_channels: u8,
    /// Number of devices per channel.
    pub max_devices: u8,
    /// Wire decoding strategy.
    pub codec: CodecConfig,
    /// Rendered line buffer size, terminator included.
    pub max_line_len: usize,
    /// Per-channel routes. Empty means every channel goes to the collector.
    pub routes: Vec<RouteConfig>,
    /// Prometheus scrape address (needs the `prometheus` feature).
    pub metrics_listen: Option<SocketAddr>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            listen: DEFAULT_LISTEN_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 50812))),
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            protocol_version: PROTOCOL_VERSION,
            max_channels: DEFAULT_MAX_CHANNELS,
            max_devices: DEFAULT_MAX_DEVICES,
            codec: CodecConfig::default(),
            max_line_len: MAX_LINE_LENGTH,
            routes: Vec::new(),
            metrics_listen: None,
        }
    }
}

impl GatewayConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Parse and validate configuration text.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        // serde_yaml rejects an empty document for a struct; treat it as defaults.
        let config: GatewayConfig = if text.trim().is_empty() {
            GatewayConfig::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_channels == 0 {
            return Err(ConfigError::Invalid("max_channels must be at least 1".into()));
        }
        if self.max_devices == 0 {
            return Err(ConfigError::Invalid("max_devices must be at least 1".into()));
        }
        if self.poll_timeout_ms == 0 {
            return Err(ConfigError::Invalid("poll_timeout_ms must be non-zero".into()));
        }

        if self.routes.is_empty() {
            return Ok(());
        }

        let mut seen = HashSet::new();
        for route in &self.routes {
            if route.channel >= self.max_channels {
                return Err(ConfigError::Invalid(format!(
                    "route channel {} is outside 0..{}",
                    route.channel, self.max_channels
                )));
            }
            if !seen.insert(route.channel) {
                return Err(ConfigError::Invalid(format!(
                    "channel {} has more than one route",
                    route.channel
                )));
            }
        }
        if let Some(missing) = (0..self.max_channels).find(|c| !seen.contains(c)) {
            return Err(ConfigError::Invalid(format!("channel {} has no route", missing)));
        }
        Ok(())
    }

    /// Frame validation bounds.
    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits {
            version: self.protocol_version,
            max_channels: self.max_channels,
            max_devices: self.max_devices,
        }
    }

    /// Readiness-wait timeout.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Sink configuration for every channel, in channel order.
    pub fn effective_routes(&self) -> Vec<RouteConfig> {
        if self.routes.is_empty() {
            return (0..self.max_channels)
                .map(|channel| RouteConfig {
                    channel,
                    sink: SinkConfig::default_collector(),
                })
                .collect();
        }
        let mut routes = self.routes.clone();
        routes.sort_by_key(|r| r.channel);
        routes
    }

    /// Build one unopened sink per channel, in channel order.
    pub fn build_sinks(&self) -> Vec<Box<dyn Sink>> {
        self.effective_routes()
            .into_iter()
            .map(|route| self.build_sink(&route))
            .collect()
    }

    fn build_sink(&self, route: &RouteConfig) -> Box<dyn Sink> {
        let renderer = |schema| {
            Renderer::new(schema)
                .with_numeric(self.codec.numeric)
                .with_max_len(self.max_line_len)
        };
        match &route.sink {
            SinkConfig::Udp {
                destination,
                schema,
                send_close_on_shutdown,
                name,
            } => {
                let name = name.clone().unwrap_or_else(|| format!("udp-{}", route.channel));
                Box::new(
                    UdpSink::new(name, *destination, renderer(*schema))
                        .with_close_on_shutdown(*send_close_on_shutdown),
                )
            }
            SinkConfig::Stdout { schema } => Box::new(WriterSink::stdout(
                format!("stdout-{}", route.channel),
                renderer(*schema),
            )),
        }
    }
}
