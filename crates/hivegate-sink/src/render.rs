//! Record to CSV line rendering.

use hivegate_packet::{FixedPoint, NumericRepr, SensorRecord, SENSOR_SLOTS};
use serde::{Deserialize, Serialize};

/// Maximum rendered line length, NUL terminator included.
pub const MAX_LINE_LENGTH: usize = 512;

/// Command token leading every routed line.
pub const ROUTED_COMMAND: &str = "write";

/// Field separator.
pub const SEPARATOR: &str = ",";

/// Line layout expected by a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schema {
    /// All fields in record order.
    #[default]
    Plain,
    /// Command, routing label and timestamp, then the readings.
    Routed,
}

/// Renders decoded records as delimited text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Renderer {
    schema: Schema,
    numeric: NumericRepr,
    max_len: usize,
}

impl Renderer {
    /// Create a renderer for `schema` with fixed-point numbers.
    pub fn new(schema: Schema) -> Self {
        Renderer {
            schema,
            numeric: NumericRepr::FixedPoint,
            max_len: MAX_LINE_LENGTH,
        }
    }

    /// Set the numeric representation of scaled fields.
    pub fn with_numeric(mut self, numeric: NumericRepr) -> Self {
        self.numeric = numeric;
        self
    }

    /// Set the line buffer size, terminator included.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// The schema this renderer produces.
    pub fn schema(&self) -> Schema {
        self.schema
    }

    /// Render one record.
    ///
    /// Fails if the line plus its terminator would not fit the line buffer.
    pub fn render(
        &self,
        channel_id: u8,
        device_id: u8,
        record: &SensorRecord,
    ) -> Result<String, crate::RenderError> {
        let fields = match self.schema {
            Schema::Plain => self.plain_fields(record),
            Schema::Routed => self.routed_fields(channel_id, device_id, record),
        };
        let line = fields.join(SEPARATOR);

        let actual = line.len() + 1;
        if actual > self.max_len {
            return Err(crate::RenderError::Overflow {
                max: self.max_len,
                actual,
            });
        }
        Ok(line)
    }

    fn scaled(&self, value: FixedPoint) -> String {
        value.display(self.numeric).to_string()
    }

    fn plain_fields(&self, record: &SensorRecord) -> Vec<String> {
        let mut fields = Vec::with_capacity(9 + 2 + 3 * SENSOR_SLOTS + 1);
        fields.extend(
            [
                record.device_id,
                record.seq_no,
                record.reserved,
                record.date.year,
                record.date.month,
                record.date.day,
                record.time.hour,
                record.time.minute,
                record.time.second,
            ]
            .iter()
            .map(u8::to_string),
        );
        fields.push(self.scaled(record.lat));
        fields.push(self.scaled(record.lon));
        for group in [&record.temp, &record.rh, &record.vol] {
            fields.extend(group.iter().map(|v| self.scaled(*v)));
        }
        fields.push(self.scaled(record.weight));
        fields
    }

    fn routed_fields(&self, channel_id: u8, device_id: u8, record: &SensorRecord) -> Vec<String> {
        let mut fields = Vec::with_capacity(5 + 3 * SENSOR_SLOTS + 1);
        fields.push(ROUTED_COMMAND.to_string());
        fields.push(routing_label(channel_id, device_id));
        fields.push(timestamp_token(record));
        fields.push(self.scaled(record.lon));
        fields.push(self.scaled(record.lat));
        // The collector reads Tem1,Hum1,Vol1,Tem2,... per sensor slot.
        for i in 0..SENSOR_SLOTS {
            fields.push(self.scaled(record.temp[i]));
            fields.push(self.scaled(record.rh[i]));
            fields.push(self.scaled(record.vol[i]));
        }
        fields.push(self.scaled(record.weight));
        fields
    }
}

/// Routing label `CC-DD` for a channel and device.
pub fn routing_label(channel_id: u8, device_id: u8) -> String {
    format!("{:02}-{:02}", channel_id, device_id)
}

/// Timestamp token `yymmddHHMMSS` from the record's date and time bytes.
pub fn timestamp_token(record: &SensorRecord) -> String {
    format!(
        "{:02}{:02}{:02}{:02}{:02}{:02}",
        record.date.year,
        record.date.month,
        record.date.day,
        record.time.hour,
        record.time.minute,
        record.time.second
    )
}
