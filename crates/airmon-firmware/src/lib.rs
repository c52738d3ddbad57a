//! ESP32-S3 firmware-specific modules for airmon
//!
//! This crate contains the code that only makes sense on the M5Stack CoreS3:
//! bringing up the Port A I2C controller and the embassy tasks that host the
//! bus arbiter, the sensor pollers and the snapshot display loop from
//! `airmon_core`.

#![no_std]

pub mod app_state;
pub mod tasks;
