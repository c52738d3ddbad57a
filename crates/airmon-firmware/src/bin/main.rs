#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use airmon_core::bus::{BusArbiter, ReplyChannel, TransactionExecutor};
use airmon_core::config::Config;
use airmon_core::producer::SensorPoller;
use airmon_core::readings::ReadingsStore;
use airmon_core::sensors::{SensorId, Sgp30, Sht40};
use airmon_firmware::app_state::{AppError, AppRunState, create_port_a_bus, register_port_a_devices};
use airmon_firmware::tasks::{PortAExecutor, bus_owner_task, display_task, sgp30_task, sht40_task};
use embassy_executor::Spawner;
use embassy_time::{Delay, Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::peripherals::Peripherals;
use esp_hal::timer::timg::TimerGroup;
use log::{LevelFilter, error, info, warn};
use static_cell::StaticCell;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

static ARBITER: StaticCell<BusArbiter<'static>> = StaticCell::new();
static STORE: StaticCell<ReadingsStore> = StaticCell::new();
static SHT40_REPLIES: StaticCell<ReplyChannel> = StaticCell::new();
static SGP30_REPLIES: StaticCell<ReplyChannel> = StaticCell::new();

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!(LevelFilter::Info);

    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    if let Err(e) = start(spawner, peripherals).await {
        error!("Start-up failed: {}", e);
        info!("Run state: {:?}", AppRunState::Error);
    }

    // Everything else happens in the spawned tasks
    loop {
        Timer::after(Duration::from_secs(60)).await;
    }
}

async fn start(spawner: Spawner, peripherals: Peripherals) -> Result<(), AppError> {
    let config = Config::default();
    config.validate()?;

    let devices = register_port_a_devices(&config)?;
    let port_a = create_port_a_bus(
        peripherals.I2C1,
        peripherals.GPIO2,
        peripherals.GPIO1,
        devices.frequency_hz,
    )?;
    info!("Run state: {:?}", AppRunState::PortAReady);

    let mut executor: PortAExecutor = TransactionExecutor::new(port_a, Delay, config.bus);
    for (sensor, device) in [
        (SensorId::TemperatureHumidity, devices.sht40),
        (SensorId::AirQuality, devices.sgp30),
    ] {
        match executor.probe(device).await {
            Ok(()) => info!("{} found at 0x{:02X}", sensor, device.address()),
            // Keep going: the sensor may be hot-plugged later
            Err(e) => warn!("{} not answering at 0x{:02X}: {}", sensor, device.address(), e),
        }
    }

    let arbiter: &'static BusArbiter<'static> = ARBITER.init(BusArbiter::new(&config.bus));
    let store: &'static ReadingsStore = STORE.init(ReadingsStore::new());

    let sht40 = SensorPoller::<Sht40>::new(
        arbiter,
        SHT40_REPLIES.init(ReplyChannel::new()),
        store,
        devices.sht40,
        config.sht40.producer,
    );
    let sgp30 = SensorPoller::<Sgp30>::new(
        arbiter,
        SGP30_REPLIES.init(ReplyChannel::new()),
        store,
        devices.sgp30,
        config.sgp30.producer,
    );

    spawner
        .spawn(bus_owner_task(arbiter, executor))
        .map_err(|_| AppError::Spawn("bus owner"))?;
    spawner
        .spawn(sht40_task(sht40))
        .map_err(|_| AppError::Spawn("SHT40 poller"))?;
    spawner
        .spawn(sgp30_task(sgp30))
        .map_err(|_| AppError::Spawn("SGP30 poller"))?;
    spawner
        .spawn(display_task(store, arbiter))
        .map_err(|_| AppError::Spawn("display"))?;

    info!("Run state: {:?}", AppRunState::SensorsRunning);
    Ok(())
}
