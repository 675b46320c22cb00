//! Integer field decoding.
//!
//! All multi-byte sensor fields share one byte order, chosen per deployment.
//! The bridge firmware in the field sends big-endian fixed-point integers;
//! newer builds send little-endian counts that are scaled as floats. Both are
//! modelled as a [`CodecConfig`] picked at configuration time.
//!
//! Callers validate the overall record length before decoding, so reading past
//! the end of a buffer is a programming error and panics.

use serde::{Deserialize, Serialize};

/// Byte order of multi-byte wire fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// Most significant byte first.
    #[default]
    Big,
    /// Least significant byte first.
    Little,
}

/// How scaled fields are turned into decimal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericRepr {
    /// Integer division by the implied power of ten.
    #[default]
    FixedPoint,
    /// Division as `f64`, printed with the implied number of digits.
    Float,
}

/// Codec strategy for one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Byte order of multi-byte fields.
    pub byte_order: ByteOrder,
    /// Numeric representation of scaled fields.
    pub numeric: NumericRepr,
}

impl CodecConfig {
    /// Create a codec configuration.
    pub const fn new(byte_order: ByteOrder, numeric: NumericRepr) -> Self {
        CodecConfig {
            byte_order,
            numeric,
        }
    }
}

fn field<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    assert!(
        offset.checked_add(N).is_some_and(|end| end <= bytes.len()),
        "field at offset {} width {} exceeds buffer of {} bytes",
        offset,
        N,
        bytes.len()
    );
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

/// Decode an unsigned 16-bit integer at `offset`.
///
/// # Panics
///
/// Panics if `offset + 2` exceeds `bytes.len()`.
pub fn decode_u16(bytes: &[u8], offset: usize, order: ByteOrder) -> u16 {
    let raw = field::<2>(bytes, offset);
    match order {
        ByteOrder::Big => u16::from_be_bytes(raw),
        ByteOrder::Little => u16::from_le_bytes(raw),
    }
}

/// Decode an unsigned 32-bit integer at `offset`.
///
/// # Panics
///
/// Panics if `offset + 4` exceeds `bytes.len()`.
pub fn decode_u32(bytes: &[u8], offset: usize, order: ByteOrder) -> u32 {
    let raw = field::<4>(bytes, offset);
    match order {
        ByteOrder::Big => u32::from_be_bytes(raw),
        ByteOrder::Little => u32::from_le_bytes(raw),
    }
}

/// Decode a 2- or 4-byte unsigned integer and divide it by `divisor`.
///
/// # Panics
///
/// Panics if `width` is not 2 or 4, or the field exceeds the buffer.
pub fn decode_scaled(
    bytes: &[u8],
    offset: usize,
    width: usize,
    order: ByteOrder,
    divisor: f64,
) -> f64 {
    let raw = match width {
        2 => f64::from(decode_u16(bytes, offset, order)),
        4 => f64::from(decode_u32(bytes, offset, order)),
        _ => panic!("unsupported field width {}", width),
    };
    raw / divisor
}
