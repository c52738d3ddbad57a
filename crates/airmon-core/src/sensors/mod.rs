mod sgp30;
mod sht40;

use core::fmt;

use embassy_time::Duration;
use thiserror_no_std::Error;

use crate::bus::{BusError, Command};
use crate::checksum::crc8;

pub use sgp30::*;
pub use sht40::*;

/// Length of a two-word Sensirion frame: `[W1_hi, W1_lo, CRC1, W2_hi, W2_lo, CRC2]`.
pub const WORD_FRAME_LEN: usize = 6;

/// Which sensor a request or reading belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorId {
    /// SHT40 temperature / relative humidity sensor.
    TemperatureHumidity,
    /// SGP30 eCO2 / TVOC air-quality sensor.
    AirQuality,
}

impl SensorId {
    pub const fn name(self) -> &'static str {
        match self {
            Self::TemperatureHumidity => "SHT40",
            Self::AirQuality => "SGP30",
        }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: bus transaction failed: {error}")]
    Bus { sensor: SensorId, error: BusError },
    #[error("{sensor}: checksum mismatch in word {word}")]
    ChecksumMismatch { sensor: SensorId, word: usize },
    #[error("{sensor}: expected a 6-byte frame, got {len}")]
    ShortFrame { sensor: SensorId, len: usize },
    #[error("{sensor}: no response to request {request_id}")]
    ReplyTimeout { sensor: SensorId, request_id: u32 },
}

/// One bus exchange a sensor needs: command, settle time, bytes to read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub command: Command,
    pub read_len: usize,
    pub settle: Duration,
}

/// The latest value from any sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorReading {
    TemperatureHumidity(Sht40Reading),
    AirQuality(Sgp30Reading),
}

/// Wire protocol of one sensor model.
///
/// A producer is generic over this, so picking the decoder for a response is
/// decided by the type the producer was built with.
pub trait SensorProtocol {
    const ID: SensorId;

    /// Command sent once before the first measurement, if the sensor needs one.
    const INIT: Option<Transfer> = None;

    /// Pause between `INIT` completing and the first measurement.
    const INIT_GUARD: Duration = Duration::from_ticks(0);

    /// The periodic measurement exchange.
    const MEASURE: Transfer;

    type Reading: Copy + fmt::Display + Into<SensorReading>;

    /// Validate a raw measurement frame and convert it to engineering units.
    fn decode(frame: &[u8]) -> Result<Self::Reading, SensorError>;
}

/// Split a checksummed two-word frame into its words.
///
/// The frame is accepted or rejected as a whole; a bad checksum on either
/// word fails the decode.
pub fn decode_words(sensor: SensorId, frame: &[u8]) -> Result<[u16; 2], SensorError> {
    if frame.len() < WORD_FRAME_LEN {
        return Err(SensorError::ShortFrame {
            sensor,
            len: frame.len(),
        });
    }

    let mut words = [0u16; 2];
    for (word, chunk) in frame[..WORD_FRAME_LEN].chunks_exact(3).enumerate() {
        if crc8(&chunk[..2]) != chunk[2] {
            return Err(SensorError::ChecksumMismatch { sensor, word });
        }
        words[word] = u16::from_be_bytes([chunk[0], chunk[1]]);
    }
    Ok(words)
}
