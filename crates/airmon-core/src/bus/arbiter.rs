//! The bus owner task: drains requests in arrival order, one at a time.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Sender};
use embassy_time::{Duration, with_timeout};
use log::{debug, warn};

use super::{BusRequest, BusResponse, Transact};
use crate::config::{BusConfig, REPLY_QUEUE_DEPTH, REQUEST_QUEUE_DEPTH};

/// A producer's private mailbox for responses.
pub type ReplyChannel = Channel<CriticalSectionRawMutex, BusResponse, REPLY_QUEUE_DEPTH>;

/// Handle the arbiter uses to answer a request.
pub type ReplySender<'r> = Sender<'r, CriticalSectionRawMutex, BusResponse, REPLY_QUEUE_DEPTH>;

/// What happened to a response after its transaction finished.
///
/// Delivery is best effort: a producer that stopped listening does not get to
/// stall the bus for everyone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The reply channel stayed full past the send timeout.
    Dropped,
    /// The request carried no reply channel.
    NotRequested,
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArbiterStats {
    pub serviced: u32,
    pub failed: u32,
    pub dropped_replies: u32,
}

impl ArbiterStats {
    const fn new() -> Self {
        Self {
            serviced: 0,
            failed: 0,
            dropped_replies: 0,
        }
    }
}

/// Serializes every transaction on one physical bus.
///
/// Producers call [`enqueue`](Self::enqueue); exactly one task runs
/// [`run`](Self::run) with the executor that owns the bus. Requests are
/// serviced strictly FIFO with no priorities.
///
/// # Example
///
/// ```rust,ignore
/// static ARBITER: StaticCell<BusArbiter<'static>> = StaticCell::new();
/// let arbiter = ARBITER.init(BusArbiter::new(&config.bus));
///
/// #[embassy_executor::task]
/// async fn bus_owner(arbiter: &'static BusArbiter<'static>, mut executor: PortAExecutor) -> ! {
///     arbiter.run(&mut executor).await
/// }
/// ```
pub struct BusArbiter<'r> {
    requests: Channel<CriticalSectionRawMutex, BusRequest<'r>, REQUEST_QUEUE_DEPTH>,
    stats: Mutex<CriticalSectionRawMutex, Cell<ArbiterStats>>,
    reply_send_timeout: Duration,
}

impl<'r> BusArbiter<'r> {
    pub const fn new(config: &BusConfig) -> Self {
        Self {
            requests: Channel::new(),
            stats: Mutex::new(Cell::new(ArbiterStats::new())),
            reply_send_timeout: config.reply_send_timeout(),
        }
    }

    /// Queue a request, waiting for space if the queue is full.
    ///
    /// This is the only backpressure producers see.
    pub async fn enqueue(&self, request: BusRequest<'r>) {
        self.requests.send(request).await;
    }

    /// Requests waiting to be serviced.
    pub fn pending(&self) -> usize {
        self.requests.len()
    }

    pub fn stats(&self) -> ArbiterStats {
        self.stats.lock(Cell::get)
    }

    /// Own the bus forever.
    pub async fn run<T: Transact>(&self, executor: &mut T) -> ! {
        loop {
            self.service_next(executor).await;
        }
    }

    /// Wait for the next request, execute it and hand back the response.
    pub async fn service_next<T: Transact>(&self, executor: &mut T) -> Delivery {
        let request = self.requests.receive().await;
        debug!(
            "{}: servicing request id={} ({} queued)",
            request.sensor,
            request.request_id,
            self.requests.len()
        );

        let result = executor.execute(&request).await;
        let response = BusResponse {
            request_id: request.request_id,
            sensor: request.sensor,
            result,
        };

        let delivery = match request.reply {
            Some(reply) => self.deliver(reply, response).await,
            None => Delivery::NotRequested,
        };

        self.stats.lock(|stats| {
            let mut s = stats.get();
            s.serviced = s.serviced.wrapping_add(1);
            if result.is_err() {
                s.failed = s.failed.wrapping_add(1);
            }
            if delivery == Delivery::Dropped {
                s.dropped_replies = s.dropped_replies.wrapping_add(1);
            }
            stats.set(s);
        });

        delivery
    }

    async fn deliver(&self, reply: ReplySender<'r>, response: BusResponse) -> Delivery {
        match with_timeout(self.reply_send_timeout, reply.send(response)).await {
            Ok(()) => Delivery::Delivered,
            Err(_) => {
                warn!(
                    "{}: dropped response id={}, requester not listening",
                    response.sensor, response.request_id
                );
                Delivery::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusError, DeviceHandle, DeviceRegistry, RawFrame};
    use crate::sensors::SensorId;
    use embassy_futures::block_on;
    use embassy_futures::select::{Either, select};
    use embassy_time::Timer;

    /// Records the order requests reach the bus.
    #[derive(Default)]
    struct RecordingExecutor {
        seen: Vec<u32>,
    }

    impl Transact for RecordingExecutor {
        async fn execute(&mut self, request: &BusRequest<'_>) -> Result<RawFrame, BusError> {
            self.seen.push(request.request_id);
            if request.request_id % 2 == 0 {
                Err(BusError::Timeout)
            } else {
                RawFrame::from_slice(&[request.request_id as u8])
            }
        }
    }

    fn config(reply_send_timeout_ms: u32) -> BusConfig {
        BusConfig {
            reply_send_timeout_ms,
            ..BusConfig::default()
        }
    }

    fn devices() -> (DeviceHandle, DeviceHandle) {
        let mut registry = DeviceRegistry::new();
        (
            registry.register(0x44, 400_000).unwrap(),
            registry.register(0x58, 100_000).unwrap(),
        )
    }

    #[test]
    fn test_fifo_across_producers() {
        let sht_replies = ReplyChannel::new();
        let sgp_replies = ReplyChannel::new();
        let arbiter = BusArbiter::new(&config(50));
        let (sht, sgp) = devices();
        let mut executor = RecordingExecutor::default();

        block_on(async {
            arbiter
                .enqueue(
                    BusRequest::new(1, SensorId::TemperatureHumidity, sht)
                        .with_reply(sht_replies.sender()),
                )
                .await;
            arbiter
                .enqueue(
                    BusRequest::new(2, SensorId::AirQuality, sgp).with_reply(sgp_replies.sender()),
                )
                .await;
            arbiter
                .enqueue(
                    BusRequest::new(3, SensorId::TemperatureHumidity, sht)
                        .with_reply(sht_replies.sender()),
                )
                .await;

            for _ in 0..3 {
                assert_eq!(
                    arbiter.service_next(&mut executor).await,
                    Delivery::Delivered
                );
            }
        });

        assert_eq!(executor.seen, [1, 2, 3]);
        assert_eq!(sht_replies.try_receive().unwrap().request_id, 1);
        assert_eq!(sht_replies.try_receive().unwrap().request_id, 3);
        let sgp_response = sgp_replies.try_receive().unwrap();
        assert_eq!(sgp_response.request_id, 2);
        assert_eq!(sgp_response.result, Err(BusError::Timeout));
        assert_eq!(
            arbiter.stats(),
            ArbiterStats {
                serviced: 3,
                failed: 1,
                dropped_replies: 0
            }
        );
    }

    #[test]
    fn test_fire_and_forget() {
        let arbiter = BusArbiter::new(&config(50));
        let (sht, _) = devices();
        let mut executor = RecordingExecutor::default();

        block_on(arbiter.enqueue(BusRequest::new(5, SensorId::TemperatureHumidity, sht)));
        let delivery = block_on(arbiter.service_next(&mut executor));

        assert_eq!(delivery, Delivery::NotRequested);
        assert_eq!(executor.seen, [5]);
    }

    #[test]
    fn test_reply_to_full_channel_is_dropped() {
        let replies = ReplyChannel::new();
        let arbiter = BusArbiter::new(&config(5));
        let (sht, _) = devices();
        let mut executor = RecordingExecutor::default();

        // Nobody drains the reply channel
        let filler = BusResponse {
            request_id: 0,
            sensor: SensorId::TemperatureHumidity,
            result: Ok(RawFrame::empty()),
        };
        for _ in 0..REPLY_QUEUE_DEPTH {
            replies.try_send(filler).unwrap();
        }

        block_on(arbiter.enqueue(
            BusRequest::new(7, SensorId::TemperatureHumidity, sht).with_reply(replies.sender()),
        ));
        let delivery = block_on(arbiter.service_next(&mut executor));

        assert_eq!(delivery, Delivery::Dropped);
        assert_eq!(arbiter.stats().dropped_replies, 1);
    }

    #[test]
    fn test_full_queue_blocks_enqueue() {
        let arbiter = BusArbiter::new(&config(50));
        let (sht, _) = devices();
        let mut executor = RecordingExecutor::default();

        block_on(async {
            for id in 0..REQUEST_QUEUE_DEPTH as u32 {
                arbiter
                    .enqueue(BusRequest::new(id, SensorId::TemperatureHumidity, sht))
                    .await;
            }
            assert_eq!(arbiter.pending(), REQUEST_QUEUE_DEPTH);

            let overflow = BusRequest::new(99, SensorId::TemperatureHumidity, sht);
            let blocked = select(
                arbiter.enqueue(overflow),
                Timer::after(Duration::from_millis(10)),
            )
            .await;
            assert!(matches!(blocked, Either::Second(())));

            // One slot frees up once the bus takes the oldest request
            arbiter.service_next(&mut executor).await;
            arbiter
                .enqueue(BusRequest::new(99, SensorId::TemperatureHumidity, sht))
                .await;
        });

        assert_eq!(executor.seen, [0]);
        assert_eq!(arbiter.pending(), REQUEST_QUEUE_DEPTH);
    }

    #[test]
    fn test_run_keeps_serving_after_failures() {
        let replies = ReplyChannel::new();
        let arbiter = BusArbiter::new(&config(50));
        let (sht, _) = devices();
        let mut executor = RecordingExecutor::default();

        let ids = block_on(async {
            let client = async {
                let mut ids = Vec::new();
                for id in [2, 4, 5] {
                    arbiter
                        .enqueue(
                            BusRequest::new(id, SensorId::TemperatureHumidity, sht)
                                .with_reply(replies.sender()),
                        )
                        .await;
                    ids.push(replies.receive().await.request_id);
                }
                ids
            };

            match select(arbiter.run(&mut executor), client).await {
                Either::First(_) => unreachable!(),
                Either::Second(ids) => ids,
            }
        });

        assert_eq!(ids, [2, 4, 5]);
        assert_eq!(arbiter.stats().failed, 2);
    }
}
