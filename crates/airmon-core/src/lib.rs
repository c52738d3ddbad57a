//! Hardware-independent core of the airmon sensor firmware
//!
//! Everything that touches the Port A I2C bus goes through here: the
//! single-owner bus arbiter and its transaction executor, the Sensirion
//! frame codecs for the SHT40 and SGP30, the shared latest-readings store,
//! and the periodic producers that tie them together.
//!
//! It is `#![no_std]` so it compiles for the ESP32-S3 firmware and for host
//! tests alike.

#![cfg_attr(not(test), no_std)]

pub mod bus;
pub mod checksum;
pub mod config;
pub mod producer;
pub mod readings;
pub mod sensors;

#[cfg(test)]
pub(crate) mod test_support;
