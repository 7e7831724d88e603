//! Owns the control state machine and the relay/solenoid outputs.

use compressor_core::config::{BridgeConfig, ControlConfig};
use compressor_core::control::{ControlMachine, ControlStep, TimeoutStore};
use compressor_core::protocol::{Info, TimerChannel};
use compressor_core::settings::{SettingsRequest, Timeouts};
use embassy_futures::select::{Either3, select3};
use embassy_time::{Timer, with_timeout};

use crate::channels::{CONTROL_REQUESTS, INBOUND, OUTBOUND, SETTINGS_REQUESTS};
use crate::hw::PinOutputs;
use crate::instant::{FirmwareInstant, to_embassy};

/// Forwards timeout changes to the settings task.
struct SettingsTimeoutStore;

impl TimeoutStore for SettingsTimeoutStore {
    fn persist_timeout(&mut self, channel: TimerChannel, minutes: u32) {
        if SETTINGS_REQUESTS
            .try_send(SettingsRequest::SetTimeout(channel, minutes))
            .is_err()
        {
            defmt::warn!("control: settings queue full, {} timeout not saved", channel.label());
        }
    }
}

type Machine = ControlMachine<PinOutputs, SettingsTimeoutStore, FirmwareInstant>;

async fn forward(info: Info) {
    let timeout = to_embassy(BridgeConfig::DEFAULT.send_timeout);
    if with_timeout(timeout, OUTBOUND.send(info)).await.is_err() {
        defmt::warn!("control: outbound queue full, dropping {}", info);
    }
}

async fn flush_infos(machine: &mut Machine) {
    while let Some(info) = machine.next_info() {
        forward(info).await;
    }
}

async fn until(deadline: Option<FirmwareInstant>) {
    match deadline {
        Some(deadline) => Timer::at(deadline.into_embassy()).await,
        None => core::future::pending().await,
    }
}

#[embassy_executor::task]
pub async fn run(outputs: PinOutputs, timeouts: Timeouts) -> ! {
    let mut machine = Machine::new(outputs, SettingsTimeoutStore, timeouts, ControlConfig::DEFAULT);

    loop {
        let deadline = machine.next_deadline();
        let step = match select3(INBOUND.receive(), CONTROL_REQUESTS.receive(), until(deadline)).await {
            Either3::First(command) => machine.handle_command(command, FirmwareInstant::now()),
            Either3::Second(request) => machine.handle_request(request, FirmwareInstant::now()),
            Either3::Third(()) => machine.poll(FirmwareInstant::now()),
        };
        flush_infos(&mut machine).await;

        if let ControlStep::Dwell(dwell) = step {
            Timer::after(to_embassy(dwell)).await;
            machine.finish_release();
            flush_infos(&mut machine).await;
        }
    }
}
