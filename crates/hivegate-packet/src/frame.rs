//! Datagram validation.
//!
//! ```text
//! |<--------------------- 47 bytes --------------------->|
//! +---------+--------+---------+------+------------------+
//! | version | length | channel | type | sensor record    |
//! +---------+--------+---------+------+------------------+
//! ```
//!
//! A datagram is either accepted whole or rejected with a single
//! [`RejectReason`]. Checks run in a fixed order and stop at the first
//! failure.

use crate::{
    RawRecord, RejectReason, DATAGRAM_SIZE, DEFAULT_MAX_CHANNELS, DEFAULT_MAX_DEVICES,
    ENVELOPE_HEADER_SIZE, PKT_PUSH_DATA, PROTOCOL_VERSION,
};

const OFFSET_VERSION: usize = 0;
const OFFSET_LENGTH: usize = 1;
const OFFSET_CHANNEL: usize = 2;
const OFFSET_TYPE: usize = 3;

/// Bounds a datagram must satisfy to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Expected protocol version byte.
    pub version: u8,
    /// Channel ids must be below this.
    pub max_channels: u8,
    /// Device ids must be below this.
    pub max_devices: u8,
}

impl Default for FrameLimits {
    fn default() -> Self {
        FrameLimits {
            version: PROTOCOL_VERSION,
            max_channels: DEFAULT_MAX_CHANNELS,
            max_devices: DEFAULT_MAX_DEVICES,
        }
    }
}

/// A datagram that passed every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedPacket<'a> {
    /// Inbound channel.
    pub channel_id: u8,
    /// Originating device.
    pub device_id: u8,
    /// The sensor record, untouched.
    pub record: &'a RawRecord,
}

/// Validate a received datagram.
pub fn validate<'a>(
    datagram: &'a [u8],
    limits: &FrameLimits,
) -> Result<ValidatedPacket<'a>, RejectReason> {
    if datagram.len() != DATAGRAM_SIZE {
        return Err(RejectReason::BadLength {
            expected: DATAGRAM_SIZE,
            actual: datagram.len(),
        });
    }

    let version = datagram[OFFSET_VERSION];
    let length = datagram[OFFSET_LENGTH];
    if version != limits.version || usize::from(length) != DATAGRAM_SIZE {
        return Err(RejectReason::BadVersion { version, length });
    }

    let packet_type = datagram[OFFSET_TYPE];
    if packet_type != PKT_PUSH_DATA {
        return Err(RejectReason::BadType(packet_type));
    }

    let channel_id = datagram[OFFSET_CHANNEL];
    if channel_id >= limits.max_channels {
        return Err(RejectReason::UnknownChannel(channel_id));
    }

    let record: &RawRecord = datagram[ENVELOPE_HEADER_SIZE..]
        .try_into()
        .map_err(|_| RejectReason::BadLength {
            expected: DATAGRAM_SIZE,
            actual: datagram.len(),
        })?;

    let device_id = record[0];
    if device_id >= limits.max_devices {
        return Err(RejectReason::UnknownDevice(device_id));
    }

    Ok(ValidatedPacket {
        channel_id,
        device_id,
        record,
    })
}

/// Build a datagram around `record` for `channel_id`.
///
/// This is what the LoRa bridge sends; the gateway itself only uses it in
/// tests and tooling.
pub fn encode_datagram(channel_id: u8, record: &RawRecord) -> [u8; DATAGRAM_SIZE] {
    let mut buf = [0u8; DATAGRAM_SIZE];
    buf[OFFSET_VERSION] = PROTOCOL_VERSION;
    buf[OFFSET_LENGTH] = DATAGRAM_SIZE as u8;
    buf[OFFSET_CHANNEL] = channel_id;
    buf[OFFSET_TYPE] = PKT_PUSH_DATA;
    buf[ENVELOPE_HEADER_SIZE..].copy_from_slice(record);
    buf
}
