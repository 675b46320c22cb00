//! Error types for hivegate-packet.

use thiserror::Error;

/// Why a datagram was discarded by [`validate`](crate::validate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// Datagram length differs from the fixed datagram size.
    #[error("invalid datagram size: expected {expected} bytes, got {actual}")]
    BadLength {
        /// Required length.
        expected: usize,
        /// Received length.
        actual: usize,
    },

    /// Version byte or declared length byte is wrong.
    #[error("malformed header: version 0x{version:02X}, declared length {length}")]
    BadVersion {
        /// Version byte as received.
        version: u8,
        /// Length byte as received.
        length: u8,
    },

    /// Packet type is not a sensor push.
    #[error("unsupported packet type: {0}")]
    BadType(u8),

    /// Channel id is outside the configured channel range.
    #[error("invalid channel id: {0}")]
    UnknownChannel(u8),

    /// Device id is outside the configured device range.
    #[error("invalid device id: {0}")]
    UnknownDevice(u8),
}

impl RejectReason {
    /// Short label for metrics and logs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RejectReason::BadLength { .. } => "bad_length",
            RejectReason::BadVersion { .. } => "bad_version",
            RejectReason::BadType(_) => "bad_type",
            RejectReason::UnknownChannel(_) => "unknown_channel",
            RejectReason::UnknownDevice(_) => "unknown_device",
        }
    }
}
