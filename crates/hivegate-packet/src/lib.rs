//! SmartHive LoRa bridge packet handling.
//!
//! This crate validates the fixed-layout UDP datagrams pushed by the LoRa
//! concentrator bridge and decodes the sensor record they carry.
//!
//! ## Datagram Format
//!
//! | Field       | Size (bytes) | Description                                      |
//! |-------------|--------------|--------------------------------------------------|
//! | version     | 1            | Protocol version, must equal [`PROTOCOL_VERSION`] |
//! | length      | 1            | Total datagram length, header included           |
//! | channel_id  | 1            | Inbound route the packet belongs to              |
//! | packet_type | 1            | Must equal [`PKT_PUSH_DATA`]                     |
//! | record      | 43           | Sensor record, see [`SensorRecord`]              |
//!
//! # Example
//!
//! ```rust
//! use hivegate_packet::{validate, CodecConfig, FrameLimits, SensorRecord, DATAGRAM_SIZE};
//!
//! let mut datagram = [0u8; DATAGRAM_SIZE];
//! datagram[0] = hivegate_packet::PROTOCOL_VERSION;
//! datagram[1] = DATAGRAM_SIZE as u8;
//! datagram[4] = 7; // device id
//!
//! let packet = validate(&datagram, &FrameLimits::default()).unwrap();
//! assert_eq!(packet.device_id, 7);
//!
//! let record = SensorRecord::decode(packet.record, &CodecConfig::default());
//! assert_eq!(record.device_id, 7);
//! ```

mod codec;
mod error;
mod frame;
mod record;

pub use codec::*;
pub use error::*;
pub use frame::*;
pub use record::*;

/// Protocol version byte expected in every datagram.
pub const PROTOCOL_VERSION: u8 = 0x12;

/// Packet type of a sensor push.
pub const PKT_PUSH_DATA: u8 = 0;

/// Size of the outer envelope header.
pub const ENVELOPE_HEADER_SIZE: usize = 4;

/// Size of the sensor record header (device id, serial number, reserved).
pub const RECORD_HEADER_SIZE: usize = 3;

/// Size of the sensor record body.
pub const RECORD_BODY_SIZE: usize = 40;

/// Size of a complete sensor record.
pub const RECORD_SIZE: usize = RECORD_HEADER_SIZE + RECORD_BODY_SIZE;

/// Size of a complete datagram.
pub const DATAGRAM_SIZE: usize = ENVELOPE_HEADER_SIZE + RECORD_SIZE;

/// Default number of inbound channels.
pub const DEFAULT_MAX_CHANNELS: u8 = 2;

/// Default number of devices per channel.
pub const DEFAULT_MAX_DEVICES: u8 = 100;

/// Raw sensor record bytes.
pub type RawRecord = [u8; RECORD_SIZE];
