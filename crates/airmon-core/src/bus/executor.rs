//! write → settle → read, with bounded retry on the read phase.

use embassy_time::with_timeout;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{debug, warn};

use super::{BusError, BusRequest, DeviceHandle, RawFrame};
use crate::config::{BusConfig, MAX_FRAME_LEN};

/// Delay after a failed read attempt before trying again.
///
/// Non-decreasing: 2, 5, 10, 20, 30 ms, then 50 ms for every later attempt.
pub const fn read_backoff_ms(attempt: u32) -> u32 {
    match attempt {
        0 => 2,
        1 => 5,
        2 => 10,
        3 => 20,
        4 => 30,
        _ => 50,
    }
}

/// Something that can carry out a [`BusRequest`] on the physical bus.
///
/// Only the arbiter calls this.
pub trait Transact {
    fn execute(
        &mut self,
        request: &BusRequest<'_>,
    ) -> impl Future<Output = Result<RawFrame, BusError>>;
}

/// Sole owner of the Port A bus.
pub struct TransactionExecutor<I, D> {
    bus: I,
    delay: D,
    config: BusConfig,
}

impl<I: I2c, D: DelayNs> TransactionExecutor<I, D> {
    pub fn new(bus: I, delay: D, config: BusConfig) -> Self {
        Self { bus, delay, config }
    }

    /// Check whether a device acknowledges its address.
    ///
    /// Sends a zero-length write. One attempt, no retry.
    pub async fn probe(&mut self, device: DeviceHandle) -> Result<(), BusError> {
        self.write(device.address(), &[]).await
    }

    #[cfg(test)]
    pub(crate) fn parts(&self) -> (&I, &D) {
        (&self.bus, &self.delay)
    }

    async fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        match with_timeout(self.config.write_timeout(), self.bus.write(address, bytes)).await {
            Ok(result) => result.map_err(BusError::from_i2c),
            Err(_) => Err(BusError::Timeout),
        }
    }

    async fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), BusError> {
        match with_timeout(self.config.read_timeout(), self.bus.read(address, buffer)).await {
            Ok(result) => result.map_err(BusError::from_i2c),
            Err(_) => Err(BusError::Timeout),
        }
    }
}

impl<I: I2c, D: DelayNs> Transact for TransactionExecutor<I, D> {
    async fn execute(&mut self, request: &BusRequest<'_>) -> Result<RawFrame, BusError> {
        if request.read_len > MAX_FRAME_LEN {
            return Err(BusError::InvalidArgument("read length exceeds frame capacity"));
        }

        let address = request.device.address();

        if !request.command.is_empty() {
            let mut buf = [0u8; 2];
            let bytes = request.command.encode(&mut buf);
            // Write failures are never retried
            self.write(address, bytes).await.inspect_err(|e| {
                warn!(
                    "{}: command write to 0x{:02X} failed: {}",
                    request.sensor, address, e
                );
            })?;
        }

        if request.settle.as_ticks() > 0 {
            self.delay.delay_ms(request.settle.as_millis() as u32).await;
        }

        let mut frame = RawFrame::empty();
        if request.read_len == 0 {
            return Ok(frame);
        }

        let attempts = u32::from(self.config.read_attempts.max(1));
        let mut last_error = BusError::Timeout;
        for attempt in 0..attempts {
            match self.read(address, frame.buffer_mut(request.read_len)).await {
                Ok(()) => {
                    if attempt > 0 {
                        debug!(
                            "{}: read succeeded on attempt {}",
                            request.sensor,
                            attempt + 1
                        );
                    }
                    return Ok(frame);
                }
                Err(e) => {
                    debug!(
                        "{}: read attempt {} of {} failed: {}",
                        request.sensor,
                        attempt + 1,
                        attempts,
                        e
                    );
                    last_error = e;
                }
            }

            if attempt + 1 < attempts {
                self.delay.delay_ms(read_backoff_ms(attempt)).await;
            }
        }

        warn!(
            "{}: giving up after {} read attempts: {}",
            request.sensor, attempts, last_error
        );
        Err(last_error)
    }
}
