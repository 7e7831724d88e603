//! GPIO watchers, the debounced press pipeline, and the interaction dispatcher.

use compressor_core::config::{BridgeConfig, ControlConfig};
use compressor_core::control::{Button, ButtonEdge, ButtonPipeline, ControlRequest, Edge, InteractionEvent};
use compressor_core::session::WakeReason;
use compressor_core::settings::SettingsRequest;
use embassy_futures::select::{Either, select};
use embassy_rp::gpio::Input;
use embassy_time::{Timer, with_timeout};

use crate::channels::{BUTTON_EDGES, CONTROL_REQUESTS, INTERACTIONS, SETTINGS_REQUESTS};
use crate::instant::{FirmwareInstant, to_embassy};
use crate::status::WAKE;

/// Pushes every edge on an active-low button; never blocks on a full queue.
#[embassy_executor::task(pool_size = 2)]
pub async fn watch(mut pin: Input<'static>, button: Button) -> ! {
    loop {
        pin.wait_for_any_edge().await;
        let edge = if pin.is_low() { Edge::Falling } else { Edge::Rising };
        let captured = ButtonEdge {
            button,
            edge,
            at: FirmwareInstant::now(),
        };
        if BUTTON_EDGES.try_send(captured).is_err() {
            defmt::debug!("buttons: edge queue full, dropping {} {}", button, edge);
        }
    }
}

async fn until(deadline: Option<FirmwareInstant>) {
    match deadline {
        Some(deadline) => Timer::at(deadline.into_embassy()).await,
        None => core::future::pending().await,
    }
}

#[embassy_executor::task]
pub async fn debounce() -> ! {
    let mut pipeline = ButtonPipeline::new(ControlConfig::DEFAULT.long_press);
    let send_timeout = to_embassy(BridgeConfig::DEFAULT.send_timeout);
    loop {
        match select(BUTTON_EDGES.receive(), until(pipeline.next_deadline())).await {
            Either::First(edge) => {
                let Some(event) = pipeline.on_edge(edge) else {
                    continue;
                };
                if with_timeout(send_timeout, INTERACTIONS.send(event)).await.is_err() {
                    defmt::warn!("buttons: interaction queue full, dropping {}", event);
                }
            }
            Either::Second(()) => {
                pipeline.poll(FirmwareInstant::now());
            }
        }
    }
}

#[embassy_executor::task]
pub async fn dispatch() -> ! {
    let send_timeout = to_embassy(BridgeConfig::DEFAULT.send_timeout);
    loop {
        let event = INTERACTIONS.receive().await;
        defmt::info!("buttons: {}", event);
        match event {
            InteractionEvent::Shutdown => {
                let sent = with_timeout(send_timeout, CONTROL_REQUESTS.send(ControlRequest::Shutdown)).await;
                if sent.is_err() {
                    defmt::warn!("buttons: control queue full, shutdown dropped");
                }
            }
            InteractionEvent::ForgetWifi => {
                let sent = with_timeout(send_timeout, SETTINGS_REQUESTS.send(SettingsRequest::Reset)).await;
                if sent.is_err() {
                    defmt::warn!("buttons: settings queue full, credentials kept");
                }
                WAKE.raise(WakeReason::ForgetNetwork);
            }
        }
    }
}
