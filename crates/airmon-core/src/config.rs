//! Compile-time defaults and runtime tunables for the sensor subsystem.
//!
//! All timings are stored in milliseconds so the structs stay plain `Copy`
//! data; use the `Duration` accessors at the call sites.

use embassy_time::Duration;
use log::warn;
use thiserror_no_std::Error;

use crate::bus::read_backoff_ms;
use crate::sensors::{SensorId, SensorProtocol, Sgp30, Sht40};

/// Depth of the arbiter's request channel (one slot per expected producer, plus headroom).
pub const REQUEST_QUEUE_DEPTH: usize = 8;

/// Depth of each producer's private reply channel.
pub const REPLY_QUEUE_DEPTH: usize = 2;

/// Largest frame any supported sensor returns.
pub const MAX_FRAME_LEN: usize = 6;

/// Maximum number of devices that can be registered on one bus.
pub const MAX_DEVICES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Bound on a single command write.
    pub write_timeout_ms: u32,
    /// Bound on a single read attempt.
    pub read_timeout_ms: u32,
    /// Total read attempts before the last error is returned.
    pub read_attempts: u8,
    /// How long the arbiter waits to hand a response to a producer before dropping it.
    pub reply_send_timeout_ms: u32,
}

impl BusConfig {
    pub const fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms as u64)
    }

    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms as u64)
    }

    pub const fn reply_send_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_send_timeout_ms as u64)
    }

    /// Longest one transaction can hold the bus when the write and every
    /// read attempt run into their timeouts.
    pub fn worst_case_transaction(&self, settle: Duration) -> Duration {
        let attempts = u32::from(self.read_attempts.max(1));
        let backoff_ms: u64 = (0..attempts - 1)
            .map(|attempt| u64::from(read_backoff_ms(attempt)))
            .sum();
        self.write_timeout()
            + settle
            + self.read_timeout() * attempts
            + Duration::from_millis(backoff_ms)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: 200,
            read_timeout_ms: 200,
            read_attempts: 8,
            reply_send_timeout_ms: 50,
        }
    }
}

/// Where a sensor lives on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// 7-bit I2C address.
    pub address: u8,
    pub scl_hz: u32,
}

/// Scheduling for one polling producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerConfig {
    pub period_ms: u32,
    /// How long the producer waits for the arbiter's response.
    pub reply_timeout_ms: u32,
}

impl ProducerConfig {
    pub const fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms as u64)
    }

    pub const fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorConfig {
    pub device: DeviceConfig,
    pub producer: ProducerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub bus: BusConfig,
    pub sht40: SensorConfig,
    pub sgp30: SensorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            // Both reply timeouts cover the retry budget when a busy sensor
            // NACKs quickly, but not a bus where every read hits the 200 ms
            // driver timeout (about 2 s per transaction). Such a transaction
            // surfaces as a reply timeout and its late response is discarded.
            sht40: SensorConfig {
                device: DeviceConfig {
                    address: 0x44,
                    scl_hz: 400_000,
                },
                producer: ProducerConfig {
                    period_ms: 2000,
                    reply_timeout_ms: 500,
                },
            },
            sgp30: SensorConfig {
                device: DeviceConfig {
                    address: 0x58,
                    scl_hz: 100_000,
                },
                producer: ProducerConfig {
                    period_ms: 1000,
                    reply_timeout_ms: 800,
                },
            },
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("read_attempts must be at least 1")]
    NoReadAttempts,
    #[error("{field} must be non-zero")]
    ZeroDuration { field: &'static str },
    #[error("SHT40 and SGP30 share address {0:#04x}")]
    AddressConflict(u8),
}

impl Config {
    /// Reject configurations the subsystem cannot run with.
    ///
    /// The reply-delivery timeout and the producers' reply timeouts are tuned
    /// independently; no ratio between them is enforced.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.read_attempts == 0 {
            return Err(ConfigError::NoReadAttempts);
        }

        let durations = [
            ("bus.write_timeout_ms", self.bus.write_timeout_ms),
            ("bus.read_timeout_ms", self.bus.read_timeout_ms),
            ("bus.reply_send_timeout_ms", self.bus.reply_send_timeout_ms),
            ("sht40.period_ms", self.sht40.producer.period_ms),
            ("sht40.reply_timeout_ms", self.sht40.producer.reply_timeout_ms),
            ("sgp30.period_ms", self.sgp30.producer.period_ms),
            ("sgp30.reply_timeout_ms", self.sgp30.producer.reply_timeout_ms),
        ];
        if let Some((field, _)) = durations.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::ZeroDuration { field });
        }

        if self.sht40.device.address == self.sgp30.device.address {
            return Err(ConfigError::AddressConflict(self.sht40.device.address));
        }

        for (sensor, shortfall) in self.reply_timeout_shortfalls() {
            if let Some(budget) = shortfall {
                warn!(
                    "{}: reply timeout is shorter than the {} ms worst-case transaction",
                    sensor,
                    budget.as_millis()
                );
            }
        }

        Ok(())
    }

    /// For each sensor, the worst-case transaction time if its reply timeout
    /// is shorter than that, otherwise `None`.
    pub fn reply_timeout_shortfalls(&self) -> [(SensorId, Option<Duration>); 2] {
        let check = |producer: &ProducerConfig, settle: Duration| {
            let budget = self.bus.worst_case_transaction(settle);
            (producer.reply_timeout() < budget).then_some(budget)
        };
        [
            (Sht40::ID, check(&self.sht40.producer, Sht40::MEASURE.settle)),
            (Sgp30::ID, check(&self.sgp30.producer, Sgp30::MEASURE.settle)),
        ]
    }
}
