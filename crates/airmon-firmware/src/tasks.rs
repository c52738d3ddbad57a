//! Embassy tasks
//!
//! Tasks cannot be generic, so each one is pinned to the concrete Port A
//! driver and sensor protocol it runs.

use airmon_core::bus::{BusArbiter, TransactionExecutor};
use airmon_core::producer::SensorPoller;
use airmon_core::readings::ReadingsStore;
use airmon_core::sensors::{Sgp30, Sht40};
use embassy_time::{Delay, Duration, Instant, Ticker};
use esp_hal::Async;
use esp_hal::i2c::master::I2c;
use log::info;

pub type PortABus = I2c<'static, Async>;
pub type PortAExecutor = TransactionExecutor<PortABus, Delay>;

/// How often the snapshot consumer refreshes.
pub const DISPLAY_PERIOD: Duration = Duration::from_millis(500);

/// Sole owner of the Port A bus.
#[embassy_executor::task]
pub async fn bus_owner_task(
    arbiter: &'static BusArbiter<'static>,
    mut executor: PortAExecutor,
) -> ! {
    info!("Port A arbiter running");
    arbiter.run(&mut executor).await
}

#[embassy_executor::task]
pub async fn sht40_task(poller: SensorPoller<'static, 'static, Sht40>) -> ! {
    poller.run().await
}

#[embassy_executor::task]
pub async fn sgp30_task(poller: SensorPoller<'static, 'static, Sgp30>) -> ! {
    poller.run().await
}

/// Reads the latest snapshot and logs it, standing in for the screen.
#[embassy_executor::task]
pub async fn display_task(
    store: &'static ReadingsStore,
    arbiter: &'static BusArbiter<'static>,
) -> ! {
    let mut ticker = Ticker::every(DISPLAY_PERIOD);
    let mut last_failed = 0;

    loop {
        let snapshot = store.snapshot();
        info!("{}", snapshot.summary(Instant::now()));

        let stats = arbiter.stats();
        if stats.failed != last_failed {
            info!(
                "Port A: {} transactions, {} failed, {} replies dropped, {} queued",
                stats.serviced,
                stats.failed,
                stats.dropped_replies,
                arbiter.pending()
            );
            last_failed = stats.failed;
        }

        ticker.next().await;
    }
}
