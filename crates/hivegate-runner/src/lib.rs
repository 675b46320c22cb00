//! SmartHive LoRa gateway.
//!
//! Reads fixed-size sensor datagrams from the LoRa bridge, drops malformed
//! ones and unchanged retransmissions, and forwards each new record as a CSV
//! line to the sink configured for its channel.
//!
//! ```no_run
//! use hivegate_runner::{Gateway, GatewayConfig, UdpSource};
//!
//! let config = GatewayConfig::default();
//! let source = UdpSource::bind(config.listen, config.poll_timeout())?;
//! let mut gateway = Gateway::from_config(source, &config)?;
//! let stats = gateway.run()?;
//! println!("forwarded {} records", stats.forwarded);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod dedup;
pub mod gateway;
pub mod source;

pub use config::{ConfigError, GatewayConfig, RouteConfig, SinkConfig};
pub use dedup::{DedupKey, DedupStore};
pub use gateway::{CancelToken, Gateway, GatewayError, GatewayState, GatewayStats, Outcome};
pub use source::{DatagramSource, Readiness, UdpSource, RECV_BUFFER_SIZE};
