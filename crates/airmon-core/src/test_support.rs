//! Scripted bus and delay doubles for host tests.

use std::collections::VecDeque;

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

use crate::checksum::word_crc;

/// What the mock saw on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    Write { address: u8, bytes: Vec<u8> },
    Read { address: u8, len: usize },
}

/// I2C double that replays scripted outcomes in order.
///
/// Writes succeed unless a write failure is queued. Reads pop the next
/// scripted result; an empty read script answers with an address NACK, like a
/// sensor that is still busy.
#[derive(Debug, Default)]
pub struct MockI2c {
    pub ops: Vec<BusOp>,
    writes: VecDeque<Result<(), ErrorKind>>,
    reads: VecDeque<Result<Vec<u8>, ErrorKind>>,
}

impl MockI2c {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_write(mut self, kind: ErrorKind) -> Self {
        self.writes.push_back(Err(kind));
        self
    }

    pub fn read_ok(mut self, bytes: &[u8]) -> Self {
        self.reads.push_back(Ok(bytes.to_vec()));
        self
    }

    pub fn read_err(mut self, kind: ErrorKind) -> Self {
        self.reads.push_back(Err(kind));
        self
    }

    pub fn reads(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, BusOp::Read { .. }))
            .count()
    }
}

pub const NACK: ErrorKind = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address);

impl ErrorType for MockI2c {
    type Error = ErrorKind;
}

impl I2c for MockI2c {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    self.ops.push(BusOp::Write {
                        address,
                        bytes: bytes.to_vec(),
                    });
                    if let Some(Err(kind)) = self.writes.pop_front() {
                        return Err(kind);
                    }
                }
                Operation::Read(buffer) => {
                    let buffer: &mut [u8] = &mut **buffer;
                    self.ops.push(BusOp::Read {
                        address,
                        len: buffer.len(),
                    });
                    let bytes = self.reads.pop_front().unwrap_or(Err(NACK))?;
                    let n = bytes.len().min(buffer.len());
                    buffer[..n].copy_from_slice(&bytes[..n]);
                }
            }
        }
        Ok(())
    }
}

/// Delay double that returns immediately and records each request in milliseconds.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    pub calls_ms: Vec<u32>,
}

impl DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.calls_ms.push(ns / 1_000_000);
    }

    async fn delay_us(&mut self, us: u32) {
        self.calls_ms.push(us / 1_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.calls_ms.push(ms);
    }
}

/// Build a valid Sensirion frame carrying two words.
pub fn frame(word1: u16, word2: u16) -> [u8; 6] {
    let [a, b] = word1.to_be_bytes();
    let [c, d] = word2.to_be_bytes();
    [a, b, word_crc(word1), c, d, word_crc(word2)]
}
