//! Sensor record decoding.
//!
//! ```text
//! |<------------------------ 43 bytes -------------------------->|
//! |<- 3 bytes ->|<---------------- 40 bytes -------------------->|
//! +----+---+----+------+------+-----+--------+------+-------+----+
//! | ID | N | PI | DATE | TIME | GPS | TEMPx4 | RHx4 | VOLx4 | WT |
//! +----+---+----+------+------+-----+--------+------+-------+----+
//! ```
//!
//! GPS is latitude then longitude, 4 bytes each with 6 implied decimal
//! digits. Temperature, humidity and voltage are 2 bytes each with 1 implied
//! digit; weight is 2 bytes with 2 implied digits.

use std::fmt;

use crate::{decode_u16, decode_u32, ByteOrder, CodecConfig, NumericRepr, RawRecord};

const OFFSET_DATE: usize = 3;
const OFFSET_TIME: usize = 6;
const OFFSET_LAT: usize = 9;
const OFFSET_LON: usize = 13;
const OFFSET_TEMP: usize = 17;
const OFFSET_RH: usize = 25;
const OFFSET_VOL: usize = 33;
const OFFSET_WEIGHT: usize = 41;

/// Implied decimal digits of latitude and longitude.
pub const GPS_DECIMALS: u8 = 6;
/// Implied decimal digits of temperature, humidity and voltage.
pub const CHANNEL_DECIMALS: u8 = 1;
/// Implied decimal digits of weight.
pub const WEIGHT_DECIMALS: u8 = 2;

/// Number of temperature/humidity/voltage slots in a record.
pub const SENSOR_SLOTS: usize = 4;

/// An unsigned wire integer with a fixed number of implied decimal digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPoint {
    /// Wire value.
    pub raw: u32,
    /// Implied decimal digits.
    pub decimals: u8,
}

impl FixedPoint {
    /// Create a fixed-point value.
    pub const fn new(raw: u32, decimals: u8) -> Self {
        FixedPoint { raw, decimals }
    }

    fn divisor(&self) -> u32 {
        10u32.pow(u32::from(self.decimals))
    }

    /// The value as a float.
    pub fn to_f64(&self) -> f64 {
        f64::from(self.raw) / f64::from(self.divisor())
    }

    /// Wrap the value for display using `repr`.
    pub fn display(&self, repr: NumericRepr) -> FixedPointDisplay {
        FixedPointDisplay { value: *self, repr }
    }
}

/// Formats as `integer.fraction` with exactly `decimals` fractional digits.
impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.decimals == 0 {
            return write!(f, "{}", self.raw);
        }
        let divisor = self.divisor();
        write!(
            f,
            "{}.{:0width$}",
            self.raw / divisor,
            self.raw % divisor,
            width = usize::from(self.decimals)
        )
    }
}

/// Display adapter returned by [`FixedPoint::display`].
#[derive(Debug, Clone, Copy)]
pub struct FixedPointDisplay {
    value: FixedPoint,
    repr: NumericRepr,
}

impl fmt::Display for FixedPointDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr {
            NumericRepr::FixedPoint => fmt::Display::fmt(&self.value, f),
            NumericRepr::Float => write!(
                f,
                "{:.prec$}",
                self.value.to_f64(),
                prec = usize::from(self.value.decimals)
            ),
        }
    }
}

/// Calendar date as sent by the sensor: two-digit year, month, day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Date {
    pub year: u8,
    pub month: u8,
    pub day: u8,
}

/// Wall clock time as sent by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Time {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// A decoded sensor record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorRecord {
    /// Device id.
    pub device_id: u8,
    /// Packet serial number.
    pub seq_no: u8,
    /// Reserved header byte (always 1 on current firmware).
    pub reserved: u8,
    /// Measurement date.
    pub date: Date,
    /// Measurement time.
    pub time: Time,
    /// Latitude north.
    pub lat: FixedPoint,
    /// Longitude east.
    pub lon: FixedPoint,
    /// Temperatures.
    pub temp: [FixedPoint; SENSOR_SLOTS],
    /// Relative humidities.
    pub rh: [FixedPoint; SENSOR_SLOTS],
    /// Voltages.
    pub vol: [FixedPoint; SENSOR_SLOTS],
    /// Hive weight.
    pub weight: FixedPoint,
}

fn slots(raw: &RawRecord, offset: usize, order: ByteOrder) -> [FixedPoint; SENSOR_SLOTS] {
    std::array::from_fn(|i| {
        FixedPoint::new(
            u32::from(decode_u16(raw, offset + 2 * i, order)),
            CHANNEL_DECIMALS,
        )
    })
}

impl SensorRecord {
    /// Decode a raw record.
    pub fn decode(raw: &RawRecord, codec: &CodecConfig) -> Self {
        let order = codec.byte_order;
        SensorRecord {
            device_id: raw[0],
            seq_no: raw[1],
            reserved: raw[2],
            date: Date {
                year: raw[OFFSET_DATE],
                month: raw[OFFSET_DATE + 1],
                day: raw[OFFSET_DATE + 2],
            },
            time: Time {
                hour: raw[OFFSET_TIME],
                minute: raw[OFFSET_TIME + 1],
                second: raw[OFFSET_TIME + 2],
            },
            lat: FixedPoint::new(decode_u32(raw, OFFSET_LAT, order), GPS_DECIMALS),
            lon: FixedPoint::new(decode_u32(raw, OFFSET_LON, order), GPS_DECIMALS),
            temp: slots(raw, OFFSET_TEMP, order),
            rh: slots(raw, OFFSET_RH, order),
            vol: slots(raw, OFFSET_VOL, order),
            weight: FixedPoint::new(
                u32::from(decode_u16(raw, OFFSET_WEIGHT, order)),
                WEIGHT_DECIMALS,
            ),
        }
    }

    /// Encode back to wire bytes.
    ///
    /// Scaled fields wider than their wire slot are truncated.
    pub fn encode(&self, order: ByteOrder) -> RawRecord {
        fn put_u16(buf: &mut RawRecord, offset: usize, value: u32, order: ByteOrder) {
            let value = value as u16;
            let bytes = match order {
                ByteOrder::Big => value.to_be_bytes(),
                ByteOrder::Little => value.to_le_bytes(),
            };
            buf[offset..offset + 2].copy_from_slice(&bytes);
        }
        fn put_u32(buf: &mut RawRecord, offset: usize, value: u32, order: ByteOrder) {
            let bytes = match order {
                ByteOrder::Big => value.to_be_bytes(),
                ByteOrder::Little => value.to_le_bytes(),
            };
            buf[offset..offset + 4].copy_from_slice(&bytes);
        }

        let mut buf = [0u8; crate::RECORD_SIZE];
        buf[0] = self.device_id;
        buf[1] = self.seq_no;
        buf[2] = self.reserved;
        let date = [self.date.year, self.date.month, self.date.day];
        buf[OFFSET_DATE..OFFSET_DATE + 3].copy_from_slice(&date);
        let time = [self.time.hour, self.time.minute, self.time.second];
        buf[OFFSET_TIME..OFFSET_TIME + 3].copy_from_slice(&time);
        put_u32(&mut buf, OFFSET_LAT, self.lat.raw, order);
        put_u32(&mut buf, OFFSET_LON, self.lon.raw, order);
        for i in 0..SENSOR_SLOTS {
            put_u16(&mut buf, OFFSET_TEMP + 2 * i, self.temp[i].raw, order);
            put_u16(&mut buf, OFFSET_RH + 2 * i, self.rh[i].raw, order);
            put_u16(&mut buf, OFFSET_VOL + 2 * i, self.vol[i].raw, order);
        }
        put_u16(&mut buf, OFFSET_WEIGHT, self.weight.raw, order);
        buf
    }
}
