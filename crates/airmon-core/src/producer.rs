//! Periodic per-sensor polling tasks.
//!
//! A [`SensorPoller`] never touches the bus itself. Every period it turns its
//! sensor's measurement [`Transfer`] into a [`BusRequest`], queues it on the
//! [`BusArbiter`], waits on its private reply channel, decodes the frame and
//! publishes the result to the [`ReadingsStore`].

use core::marker::PhantomData;

use embassy_time::{Instant, Ticker, Timer, with_deadline};
use log::{debug, info, warn};

use crate::bus::{BusArbiter, BusRequest, DeviceHandle, RawFrame, ReplyChannel};
use crate::config::ProducerConfig;
use crate::readings::ReadingsStore;
use crate::sensors::{SensorError, SensorProtocol, Transfer};

/// Polls one sensor of protocol `P` through the shared arbiter.
pub struct SensorPoller<'a, 'r, P> {
    arbiter: &'a BusArbiter<'r>,
    replies: &'r ReplyChannel,
    store: &'a ReadingsStore,
    device: DeviceHandle,
    config: ProducerConfig,
    next_request_id: u32,
    _protocol: PhantomData<P>,
}

impl<'a, 'r, P: SensorProtocol> SensorPoller<'a, 'r, P> {
    /// `replies` must not be shared with another poller.
    pub fn new(
        arbiter: &'a BusArbiter<'r>,
        replies: &'r ReplyChannel,
        store: &'a ReadingsStore,
        device: DeviceHandle,
        config: ProducerConfig,
    ) -> Self {
        Self {
            arbiter,
            replies,
            store,
            device,
            config,
            next_request_id: 1,
            _protocol: PhantomData,
        }
    }

    /// Send the sensor's one-time init command, if it has one, then wait out
    /// the guard time before the first measurement.
    pub async fn initialize(&mut self) -> Result<(), SensorError> {
        let result = match P::INIT {
            Some(init) => self.transact(init).await.map(|_| ()),
            None => Ok(()),
        };

        if P::INIT_GUARD.as_ticks() > 0 {
            Timer::after(P::INIT_GUARD).await;
        }

        if result.is_ok() && P::INIT.is_some() {
            info!("{}: initialized", P::ID);
        }
        result
    }

    /// Run one measurement and, if it decodes, publish it.
    ///
    /// The store is left untouched on any failure so the last good reading
    /// stays visible.
    pub async fn poll_once(&mut self) -> Result<P::Reading, SensorError> {
        let frame = self.transact(P::MEASURE).await?;
        let reading = P::decode(frame.as_bytes())?;
        self.store.update(reading.into(), Instant::now());
        Ok(reading)
    }

    /// Initialize, then poll forever on a fixed-rate schedule.
    ///
    /// Every failure is logged and the poller waits for its next period;
    /// nothing is retried within a period beyond what the executor already did.
    pub async fn run(mut self) -> ! {
        if let Err(e) = self.initialize().await {
            warn!("{e}, measuring anyway");
        }

        let mut ticker = Ticker::every(self.config.period());
        loop {
            match self.poll_once().await {
                Ok(reading) => debug!("{}: {}", P::ID, reading),
                Err(e) => warn!("{e}"),
            }
            ticker.next().await;
        }
    }

    async fn transact(&mut self, transfer: Transfer) -> Result<RawFrame, SensorError> {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);

        let request = BusRequest::new(request_id, P::ID, self.device)
            .with_command(transfer.command)
            .with_read(transfer.read_len)
            .with_settle(transfer.settle)
            .with_reply(self.replies.sender());

        // Blocks while the request queue is full
        self.arbiter.enqueue(request).await;

        let deadline = Instant::now() + self.config.reply_timeout();
        loop {
            let response = with_deadline(deadline, self.replies.receive())
                .await
                .map_err(|_| SensorError::ReplyTimeout {
                    sensor: P::ID,
                    request_id,
                })?;

            if response.request_id == request_id {
                return response.result.map_err(|error| SensorError::Bus {
                    sensor: P::ID,
                    error,
                });
            }

            // Late answer to a request this poller already gave up on
            debug!(
                "{}: discarding stale response id={} (waiting for {})",
                P::ID,
                response.request_id,
                request_id
            );
        }
    }
}
