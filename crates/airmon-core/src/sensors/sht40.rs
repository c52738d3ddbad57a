use core::fmt;

use embassy_time::Duration;

use super::{SensorError, SensorId, SensorProtocol, SensorReading, Transfer, decode_words};
use crate::bus::Command;

/// Measure T & RH with high repeatability, heater off.
pub const SHT40_CMD_MEASURE_HIGH_PRECISION: u8 = 0xFD;

/// Typed readings from the SHT40 sensor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sht40Reading {
    pub temperature_c: f32,
    /// Relative humidity, clamped to 0..=100.
    pub humidity_percent: f32,
}

impl Sht40Reading {
    /// Convert raw sensor words using the datasheet transfer functions.
    pub fn from_raw(raw_temperature: u16, raw_humidity: u16) -> Self {
        let temperature_c = -45.0 + 175.0 * (f32::from(raw_temperature) / 65535.0);
        // The RH transfer function overshoots slightly at both ends
        let humidity_percent =
            (-6.0 + 125.0 * (f32::from(raw_humidity) / 65535.0)).clamp(0.0, 100.0);

        Self {
            temperature_c,
            humidity_percent,
        }
    }
}

impl fmt::Display for Sht40Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} C, {:.2} %RH",
            self.temperature_c, self.humidity_percent
        )
    }
}

impl From<Sht40Reading> for SensorReading {
    fn from(reading: Sht40Reading) -> Self {
        Self::TemperatureHumidity(reading)
    }
}

/// SHT40 temperature / humidity sensor (address 0x44).
pub struct Sht40;

impl SensorProtocol for Sht40 {
    const ID: SensorId = SensorId::TemperatureHumidity;

    // High-precision conversion takes up to 8.3 ms
    const MEASURE: Transfer = Transfer {
        command: Command::Byte(SHT40_CMD_MEASURE_HIGH_PRECISION),
        read_len: 6,
        settle: Duration::from_millis(10),
    };

    type Reading = Sht40Reading;

    fn decode(frame: &[u8]) -> Result<Sht40Reading, SensorError> {
        let [raw_temperature, raw_humidity] = decode_words(Self::ID, frame)?;
        Ok(Sht40Reading::from_raw(raw_temperature, raw_humidity))
    }
}
