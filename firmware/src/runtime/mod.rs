//! Board bring-up and task wiring.

use compressor_core::control::Button;
use compressor_core::settings::SettingsService;
use compressor_core::status::BridgeStatus;
use cyw43::PowerManagementMode;
use cyw43_pio::{DEFAULT_CLOCK_DIVIDER, PioSpi};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_net::StackResources;
use embassy_rp::adc::{self, Adc};
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::peripherals::{DMA_CH0, PIO0, PIO1};
use embassy_rp::pio::{self, Pio};
use embassy_rp::pio_programs::ws2812::{PioWs2812, PioWs2812Program};
use embassy_rp::watchdog::Watchdog;
use static_cell::StaticCell;

use crate::hw::{CywRadio, FlashStore, PinOutputs};
use crate::status::{LINK, SETTINGS};

mod bridge_task;
mod button_task;
mod control_task;
mod indicator_task;
mod provisioning_task;
mod sensor_task;
mod session_task;
mod settings_task;
mod watchdog_task;

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => pio::InterruptHandler<PIO0>;
    PIO1_IRQ_0 => pio::InterruptHandler<PIO1>;
    ADC_IRQ_FIFO => adc::InterruptHandler;
});

/// Radio firmware images programmed alongside the application.
const CYW43_FIRMWARE_ADDR: usize = 0x1014_0000;
const CYW43_FIRMWARE_LEN: usize = 230_321;
const CYW43_CLM_ADDR: usize = 0x1018_0000;
const CYW43_CLM_LEN: usize = 4_752;

/// Bridge, HTTP, DHCP server, and DHCP client.
const NET_SOCKETS: usize = 4;

static CYW43_STATE: StaticCell<cyw43::State> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<NET_SOCKETS>> = StaticCell::new();
static BRIDGE_STATUS: StaticCell<BridgeStatus<'static>> = StaticCell::new();

fn flash_image(addr: usize, len: usize) -> &'static [u8] {
    // SAFETY: XIP flash is mapped read-only for the lifetime of the program
    // and these regions lie outside the application and settings sectors.
    unsafe { core::slice::from_raw_parts(addr as *const u8, len) }
}

type RadioSpi = PioSpi<'static, PIO0, 0, DMA_CH0>;

#[embassy_executor::task]
async fn cyw43_task(runner: cyw43::Runner<'static, Output<'static>, RadioSpi>) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, cyw43::NetDriver<'static>>) -> ! {
    runner.run().await
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let p = embassy_rp::init(embassy_rp::config::Config::default());

    spawner.spawn(watchdog_task::run(Watchdog::new(p.WATCHDOG)).expect("failed to spawn watchdog task"));

    let mut store = FlashStore::new(p.FLASH);
    let seed = store.unique_id();
    let settings = SettingsService::load(store);
    SETTINGS.publish(settings.current());
    let timeouts = settings.current().timeouts;
    spawner.spawn(settings_task::run(settings).expect("failed to spawn settings task"));

    let outputs = PinOutputs::new(
        Output::new(p.PIN_17, Level::Low),
        Output::new(p.PIN_15, Level::Low),
    );
    spawner.spawn(control_task::run(outputs, timeouts).expect("failed to spawn control task"));

    let adc = Adc::new(p.ADC, Irqs, adc::Config::default());
    let pressure = adc::Channel::new_pin(p.PIN_26, Pull::None);
    let current = adc::Channel::new_pin(p.PIN_27, Pull::None);
    spawner.spawn(sensor_task::run(adc, pressure, current).expect("failed to spawn sensor task"));

    spawner.spawn(
        button_task::watch(Input::new(p.PIN_6, Pull::Up), Button::Shutdown)
            .expect("failed to spawn shutdown button task"),
    );
    spawner.spawn(
        button_task::watch(Input::new(p.PIN_4, Pull::Up), Button::ForgetWifi)
            .expect("failed to spawn forget button task"),
    );
    spawner.spawn(button_task::debounce().expect("failed to spawn button pipeline task"));
    spawner.spawn(button_task::dispatch().expect("failed to spawn interaction task"));

    let mut pixel_pio = Pio::new(p.PIO1, Irqs);
    let program = PioWs2812Program::new(&mut pixel_pio.common);
    let pixel = PioWs2812::new(&mut pixel_pio.common, pixel_pio.sm0, p.DMA_CH1, p.PIN_3, &program);
    spawner.spawn(indicator_task::run(pixel).expect("failed to spawn indicator task"));

    let power = Output::new(p.PIN_23, Level::Low);
    let select = Output::new(p.PIN_25, Level::High);
    let mut radio_pio = Pio::new(p.PIO0, Irqs);
    let spi = PioSpi::new(
        &mut radio_pio.common,
        radio_pio.sm0,
        DEFAULT_CLOCK_DIVIDER,
        radio_pio.irq0,
        select,
        p.PIN_24,
        p.PIN_29,
        p.DMA_CH0,
    );
    let state = CYW43_STATE.init(cyw43::State::new());
    let firmware = flash_image(CYW43_FIRMWARE_ADDR, CYW43_FIRMWARE_LEN);
    let (net_device, mut control, runner) = cyw43::new(state, power, spi, firmware).await;
    spawner.spawn(cyw43_task(runner).expect("failed to spawn radio task"));
    control.init(flash_image(CYW43_CLM_ADDR, CYW43_CLM_LEN)).await;
    control
        .set_power_management(PowerManagementMode::PowerSave)
        .await;

    let (stack, net_runner) = embassy_net::new(
        net_device,
        embassy_net::Config::default(),
        NET_RESOURCES.init(StackResources::new()),
        seed,
    );
    spawner.spawn(net_task(net_runner).expect("failed to spawn network task"));

    spawner.spawn(provisioning_task::http(stack).expect("failed to spawn HTTP task"));
    spawner.spawn(provisioning_task::dhcp(stack).expect("failed to spawn DHCP task"));

    let bridge_status = BRIDGE_STATUS.init(LINK.bridge_writer().expect("bridge status already claimed"));
    let session_status = LINK.session_writer().expect("session status already claimed");
    let host = session_task::FirmwareHost::new(spawner, stack, bridge_status);
    spawner.spawn(session_task::watch_credentials().expect("failed to spawn credentials watch"));
    spawner.spawn(
        session_task::run(CywRadio::new(control, stack), host, session_status)
            .expect("failed to spawn session task"),
    );

    defmt::info!("compressor controller up");
    core::future::pending::<()>().await;
}
