//! Start-up state and error types for airmon

mod hardware;

pub use hardware::*;

use core::fmt::{Debug, Write};

use airmon_core::bus::BusError;
use airmon_core::config::ConfigError;
use thiserror_no_std::Error;

/// Where start-up currently is. Logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRunState {
    PortAReady,
    SensorsRunning,
    Error,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    Config(ConfigError),
    #[error("I2C setup failed: {0}")]
    I2cSetup(heapless::String<64>),
    #[error("Bus error: {0}")]
    Bus(BusError),
    #[error("Task spawn failed: {0}")]
    Spawn(&'static str),
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<BusError> for AppError {
    fn from(value: BusError) -> Self {
        Self::Bus(value)
    }
}

impl AppError {
    /// Wrap a driver error that only offers `Debug`. Long messages are truncated.
    pub fn i2c_setup<E: Debug>(error: E) -> Self {
        let mut message = heapless::String::new();
        let _ = write!(message, "{:?}", error);
        Self::I2cSetup(message)
    }
}
