//! Hardware initialization for the CoreS3 Port A sensors
//!
//! The Grove 5V rail must already be on when this runs; switching it is
//! left to the board bring-up that precedes the firmware.

use airmon_core::bus::{DeviceHandle, DeviceRegistry};
use airmon_core::config::Config;
use esp_hal::Async;
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::time::Rate;
use log::info;

use super::AppError;

/// Port A devices, registered from the configuration.
pub struct PortADevices {
    pub sht40: DeviceHandle,
    pub sgp30: DeviceHandle,
    /// Clock every registered device tolerates.
    pub frequency_hz: u32,
}

pub fn register_port_a_devices(config: &Config) -> Result<PortADevices, AppError> {
    let mut registry = DeviceRegistry::new();
    let sht40 = registry.register(config.sht40.device.address, config.sht40.device.scl_hz)?;
    let sgp30 = registry.register(config.sgp30.device.address, config.sgp30.device.scl_hz)?;

    let frequency_hz = registry
        .bus_frequency_hz()
        .unwrap_or(config.sgp30.device.scl_hz);
    info!("Port A clock: {} Hz", frequency_hz);

    Ok(PortADevices {
        sht40,
        sgp30,
        frequency_hz,
    })
}

/// Initialize the Grove Port A bus (SDA GPIO2, SCL GPIO1).
pub fn create_port_a_bus(
    i2c1: esp_hal::peripherals::I2C1<'static>,
    sda: esp_hal::peripherals::GPIO2<'static>,
    scl: esp_hal::peripherals::GPIO1<'static>,
    frequency_hz: u32,
) -> Result<I2c<'static, Async>, AppError> {
    Ok(
        I2c::new(i2c1, I2cConfig::default().with_frequency(Rate::from_hz(frequency_hz)))
            .map_err(AppError::i2c_setup)?
            .with_sda(sda)
            .with_scl(scl)
            .into_async(),
    )
}
