//! Port A bus plumbing
//!
//! Producers never hold the I2C peripheral. They describe what they want as a
//! [`BusRequest`], hand it to the [`BusArbiter`], and get a [`BusResponse`]
//! back on their own reply channel. The arbiter is the only caller of the
//! [`TransactionExecutor`], which is the only owner of the bus.

mod arbiter;
mod executor;

pub use arbiter::*;
pub use executor::*;

use embassy_time::Duration;
use embedded_hal::i2c::ErrorKind;
use log::info;
use thiserror_no_std::Error;

use crate::config::{MAX_DEVICES, MAX_FRAME_LEN};
use crate::sensors::SensorId;

/// Failures reported by the transaction executor.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The request was malformed and never reached the hardware.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The driver reported a NACK, bus error or arbitration loss.
    #[error("transport error: {0}")]
    Transport(ErrorKind),
    /// The driver did not finish within the configured bound.
    #[error("bus operation timed out")]
    Timeout,
}

impl BusError {
    pub(crate) fn from_i2c<E: embedded_hal::i2c::Error>(error: E) -> Self {
        Self::Transport(error.kind())
    }
}

/// A device registered on the bus.
///
/// Only [`DeviceRegistry::register`] hands these out, so holding one means the
/// address was validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHandle {
    address: u8,
    scl_hz: u32,
}

impl DeviceHandle {
    pub const fn address(&self) -> u8 {
        self.address
    }

    pub const fn scl_hz(&self) -> u32 {
        self.scl_hz
    }
}

/// Devices known to live on one bus.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: heapless::Vec<DeviceHandle, MAX_DEVICES>,
}

impl DeviceRegistry {
    pub const fn new() -> Self {
        Self {
            devices: heapless::Vec::new(),
        }
    }

    /// Register a device at a 7-bit `address` that tolerates clocks up to `scl_hz`.
    pub fn register(&mut self, address: u8, scl_hz: u32) -> Result<DeviceHandle, BusError> {
        if address > 0x7F {
            return Err(BusError::InvalidArgument("address is wider than 7 bits"));
        }
        // 0b0000xxx and 0b1111xxx are reserved by the I2C specification
        if address < 0x08 || address > 0x77 {
            return Err(BusError::InvalidArgument("reserved I2C address"));
        }
        if scl_hz == 0 {
            return Err(BusError::InvalidArgument("clock speed must be non-zero"));
        }
        if self.devices.iter().any(|d| d.address == address) {
            return Err(BusError::InvalidArgument("address already registered"));
        }

        let handle = DeviceHandle { address, scl_hz };
        self.devices
            .push(handle)
            .map_err(|_| BusError::InvalidArgument("device table is full"))?;

        info!("Registered I2C device 0x{:02X} at {} Hz", address, scl_hz);
        Ok(handle)
    }

    /// Fastest clock every registered device tolerates.
    pub fn bus_frequency_hz(&self) -> Option<u32> {
        self.devices.iter().map(|d| d.scl_hz).min()
    }
}

/// Command bytes written before a read.
///
/// Two-byte commands go out big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    None,
    Byte(u8),
    Word(u16),
}

impl Command {
    pub const fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Byte(_) => 1,
            Self::Word(_) => 2,
        }
    }

    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Wire encoding into `buf`, returning the bytes to transmit.
    pub fn encode<'b>(&self, buf: &'b mut [u8; 2]) -> &'b [u8] {
        match *self {
            Self::None => {}
            Self::Byte(code) => buf[0] = code,
            Self::Word(code) => *buf = code.to_be_bytes(),
        }
        &buf[..self.len()]
    }
}

/// Raw bytes read from a device, not yet validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawFrame {
    bytes: [u8; MAX_FRAME_LEN],
    len: u8,
}

impl RawFrame {
    pub const fn empty() -> Self {
        Self {
            bytes: [0; MAX_FRAME_LEN],
            len: 0,
        }
    }

    /// Copy `bytes` into a frame. Fails if it exceeds [`MAX_FRAME_LEN`].
    pub fn from_slice(bytes: &[u8]) -> Result<Self, BusError> {
        if bytes.len() > MAX_FRAME_LEN {
            return Err(BusError::InvalidArgument("frame exceeds buffer capacity"));
        }
        let mut frame = Self::empty();
        frame.bytes[..bytes.len()].copy_from_slice(bytes);
        frame.len = bytes.len() as u8;
        Ok(frame)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub(crate) fn buffer_mut(&mut self, len: usize) -> &mut [u8] {
        self.len = len as u8;
        &mut self.bytes[..len]
    }
}

/// One unit of work for the arbiter: write `command`, wait `settle`, read
/// `read_len` bytes.
#[derive(Clone, Copy)]
pub struct BusRequest<'r> {
    /// Caller-assigned id echoed in the response, for tracing.
    pub request_id: u32,
    pub sensor: SensorId,
    pub device: DeviceHandle,
    pub command: Command,
    /// Bytes to read back, 0 for write-only commands.
    pub read_len: usize,
    /// Time the device needs after the command before it can be read.
    pub settle: Duration,
    /// Where to send the response. `None` means fire-and-forget.
    pub reply: Option<ReplySender<'r>>,
}

impl<'r> BusRequest<'r> {
    pub const fn new(request_id: u32, sensor: SensorId, device: DeviceHandle) -> Self {
        Self {
            request_id,
            sensor,
            device,
            command: Command::None,
            read_len: 0,
            settle: Duration::from_ticks(0),
            reply: None,
        }
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.command = command;
        self
    }

    pub fn with_read(mut self, read_len: usize) -> Self {
        self.read_len = read_len;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_reply(mut self, reply: ReplySender<'r>) -> Self {
        self.reply = Some(reply);
        self
    }
}

/// Result of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusResponse {
    pub request_id: u32,
    pub sensor: SensorId,
    pub result: Result<RawFrame, BusError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_command_is_big_endian() {
        let mut buf = [0; 2];
        assert_eq!(Command::Word(0x2008).encode(&mut buf), &[0x20, 0x08]);
    }

    #[test]
    fn test_byte_and_empty_commands() {
        let mut buf = [0; 2];
        assert_eq!(Command::Byte(0xFD).encode(&mut buf), &[0xFD]);
        assert!(Command::None.encode(&mut buf).is_empty());
    }

    #[test]
    fn test_registry_rejects_bad_addresses() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.register(0x80, 100_000).is_err());
        assert!(registry.register(0x03, 100_000).is_err());
        assert!(registry.register(0x7A, 100_000).is_err());
        assert!(registry.register(0x44, 0).is_err());
        assert_eq!(registry.bus_frequency_hz(), None);
    }

    #[test]
    fn test_registry_rejects_duplicates_and_overflow() {
        let mut registry = DeviceRegistry::new();
        registry.register(0x44, 400_000).unwrap();
        assert_eq!(
            registry.register(0x44, 100_000),
            Err(BusError::InvalidArgument("address already registered"))
        );

        for address in 0x50..0x50 + (MAX_DEVICES as u8 - 1) {
            registry.register(address, 100_000).unwrap();
        }
        assert_eq!(
            registry.register(0x60, 100_000),
            Err(BusError::InvalidArgument("device table is full"))
        );
    }

    #[test]
    fn test_bus_frequency_is_slowest_device() {
        let mut registry = DeviceRegistry::new();
        assert_eq!(registry.bus_frequency_hz(), None);
        registry.register(0x44, 400_000).unwrap();
        registry.register(0x58, 100_000).unwrap();
        assert_eq!(registry.bus_frequency_hz(), Some(100_000));
    }

    #[test]
    fn test_frame_capacity() {
        let frame = RawFrame::from_slice(&[1, 2, 3]).unwrap();
        assert_eq!(frame.as_bytes(), &[1, 2, 3]);
        assert!(RawFrame::from_slice(&[0; MAX_FRAME_LEN + 1]).is_err());
    }
}
