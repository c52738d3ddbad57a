use core::fmt;

use embassy_time::Duration;

use super::{SensorError, SensorId, SensorProtocol, SensorReading, Transfer, decode_words};
use crate::bus::Command;

/// Start the IAQ algorithm. Required once after power-up.
pub const SGP30_CMD_IAQ_INIT: u16 = 0x2003;
/// Read eCO2 and TVOC. Must be issued about once per second to keep the
/// dynamic baseline compensation running.
pub const SGP30_CMD_MEASURE_IAQ: u16 = 0x2008;

/// Values the SGP30 reports for the first ~15 s after IAQ init.
const WARMUP_ECO2_PPM: u16 = 400;
const WARMUP_TVOC_PPB: u16 = 0;

/// Typed readings from the SGP30 sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sgp30Reading {
    pub eco2_ppm: u16,
    pub tvoc_ppb: u16,
}

impl Sgp30Reading {
    /// True while the sensor still returns its fixed warm-up values.
    pub const fn is_warming_up(&self) -> bool {
        self.eco2_ppm == WARMUP_ECO2_PPM && self.tvoc_ppb == WARMUP_TVOC_PPB
    }
}

impl fmt::Display for Sgp30Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eCO2 {} ppm, TVOC {} ppb", self.eco2_ppm, self.tvoc_ppb)?;
        if self.is_warming_up() {
            f.write_str(" (warming up)")?;
        }
        Ok(())
    }
}

impl From<Sgp30Reading> for SensorReading {
    fn from(reading: Sgp30Reading) -> Self {
        Self::AirQuality(reading)
    }
}

/// SGP30 air-quality sensor (address 0x58).
pub struct Sgp30;

impl SensorProtocol for Sgp30 {
    const ID: SensorId = SensorId::AirQuality;

    const INIT: Option<Transfer> = Some(Transfer {
        command: Command::Word(SGP30_CMD_IAQ_INIT),
        read_len: 0,
        settle: Duration::from_millis(100),
    });

    const INIT_GUARD: Duration = Duration::from_millis(10);

    // Reading too early makes the sensor NACK while it updates internally
    const MEASURE: Transfer = Transfer {
        command: Command::Word(SGP30_CMD_MEASURE_IAQ),
        read_len: 6,
        settle: Duration::from_millis(30),
    };

    type Reading = Sgp30Reading;

    fn decode(frame: &[u8]) -> Result<Sgp30Reading, SensorError> {
        let [eco2_ppm, tvoc_ppb] = decode_words(Self::ID, frame)?;
        Ok(Sgp30Reading { eco2_ppm, tvoc_ppb })
    }
}
