//! Latest validated reading per sensor, shared between producers and consumers.

use core::cell::RefCell;
use core::fmt::Write;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Instant;

use crate::sensors::{Sgp30Reading, Sht40Reading, SensorId, SensorReading};

/// A reading and the monotonic time it was stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<R> {
    pub reading: R,
    pub updated_at: Instant,
}

/// Point-in-time copy of every sensor's latest reading.
///
/// `None` means the sensor has not produced a valid frame since boot. Once an
/// entry is `Some` it never goes back to `None`; a sensor that stops answering
/// simply keeps its last sample and an old `updated_at`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Snapshot {
    pub sht40: Option<Sample<Sht40Reading>>,
    pub sgp30: Option<Sample<Sgp30Reading>>,
}

impl Snapshot {
    pub const fn empty() -> Self {
        Self {
            sht40: None,
            sgp30: None,
        }
    }

    pub const fn is_valid(&self, sensor: SensorId) -> bool {
        match sensor {
            SensorId::TemperatureHumidity => self.sht40.is_some(),
            SensorId::AirQuality => self.sgp30.is_some(),
        }
    }

    /// When `sensor` was last updated, if ever.
    pub fn updated_at(&self, sensor: SensorId) -> Option<Instant> {
        match sensor {
            SensorId::TemperatureHumidity => self.sht40.map(|s| s.updated_at),
            SensorId::AirQuality => self.sgp30.map(|s| s.updated_at),
        }
    }

    /// One-line summary for the status display / log.
    ///
    /// Sensors without a reading yet are shown as `--`.
    pub fn summary(&self, now: Instant) -> heapless::String<128> {
        let mut line = heapless::String::new();
        let uptime = now.as_millis();

        // 128 bytes always fits the longest possible line, so writes cannot fail
        let _ = write!(line, "up {}.{}s", uptime / 1000, (uptime % 1000) / 100);
        let _ = match self.sht40 {
            Some(s) => write!(
                line,
                " | T {:.2} C | RH {:.2} %",
                s.reading.temperature_c, s.reading.humidity_percent
            ),
            None => line.push_str(" | T -- | RH --").map_err(|_| core::fmt::Error),
        };
        let _ = match self.sgp30 {
            Some(s) => write!(
                line,
                " | eCO2 {} ppm | TVOC {} ppb",
                s.reading.eco2_ppm, s.reading.tvoc_ppb
            ),
            None => line.push_str(" | eCO2 -- | TVOC --").map_err(|_| core::fmt::Error),
        };

        line
    }
}

/// Concurrent-safe holder of the latest [`Snapshot`].
///
/// Every access takes the same lock and the critical sections only copy
/// plain data, so readers never see a half-updated sensor entry.
pub struct ReadingsStore {
    latest: Mutex<CriticalSectionRawMutex, RefCell<Snapshot>>,
}

impl Default for ReadingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadingsStore {
    pub const fn new() -> Self {
        Self {
            latest: Mutex::new(RefCell::new(Snapshot::empty())),
        }
    }

    /// Replace one sensor's entry. Other sensors are untouched.
    pub fn update(&self, reading: SensorReading, at: Instant) {
        self.latest.lock(|latest| {
            let mut latest = latest.borrow_mut();
            match reading {
                SensorReading::TemperatureHumidity(reading) => {
                    latest.sht40 = Some(Sample {
                        reading,
                        updated_at: at,
                    });
                }
                SensorReading::AirQuality(reading) => {
                    latest.sgp30 = Some(Sample {
                        reading,
                        updated_at: at,
                    });
                }
            }
        });
    }

    /// Copy out every sensor's entry in one critical section.
    pub fn snapshot(&self) -> Snapshot {
        self.latest.lock(|latest| *latest.borrow())
    }
}
