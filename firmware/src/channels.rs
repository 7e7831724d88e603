//! Bounded channels shared between firmware tasks.
//!
//! On target every queue is a `static` so producers and consumers can be
//! spawned independently; capacities come from `compressor_core::config`.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use compressor_core::config::{
    CONTROL_REQUEST_DEPTH, EDGE_QUEUE_DEPTH, INBOUND_QUEUE_DEPTH, INTERACTION_QUEUE_DEPTH,
    OUTBOUND_QUEUE_DEPTH, SETTINGS_QUEUE_DEPTH,
};
use compressor_core::control::{ButtonEdge, ControlRequest, InteractionEvent};
use compressor_core::protocol::{Command, Info};
use compressor_core::settings::SettingsRequest;
use embassy_sync::channel::{Channel, Receiver, Sender};

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;

use crate::instant::FirmwareInstant;

#[cfg(target_os = "none")]
pub type BridgeMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
pub type BridgeMutex = NoopRawMutex;

/// Commands decoded by the socket bridge, consumed by the control task.
pub type InboundChannel = Channel<BridgeMutex, Command, INBOUND_QUEUE_DEPTH>;

/// Info reports waiting for the socket bridge.
pub type OutboundChannel = Channel<BridgeMutex, Info, OUTBOUND_QUEUE_DEPTH>;

/// Raw button edges captured by the GPIO watchers.
pub type EdgeChannel = Channel<BridgeMutex, ButtonEdge<FirmwareInstant>, EDGE_QUEUE_DEPTH>;

/// Debounced interactions for the dispatcher.
pub type InteractionChannel = Channel<BridgeMutex, InteractionEvent, INTERACTION_QUEUE_DEPTH>;

/// Sensor triggers and shutdown requests for the control task.
pub type ControlRequestChannel = Channel<BridgeMutex, ControlRequest, CONTROL_REQUEST_DEPTH>;

/// Settings mutations for the settings task.
pub type SettingsChannel = Channel<BridgeMutex, SettingsRequest, SETTINGS_QUEUE_DEPTH>;

pub type SettingsSender<'a> = Sender<'a, BridgeMutex, SettingsRequest, SETTINGS_QUEUE_DEPTH>;
pub type SettingsReceiver<'a> = Receiver<'a, BridgeMutex, SettingsRequest, SETTINGS_QUEUE_DEPTH>;

#[cfg(target_os = "none")]
mod queues {
    use embassy_sync::channel::Channel;
    use embassy_sync::signal::Signal;

    use super::{
        BridgeMutex, ControlRequestChannel, EdgeChannel, InboundChannel, InteractionChannel,
        OutboundChannel, SettingsChannel,
    };

    pub static INBOUND: InboundChannel = Channel::new();
    pub static OUTBOUND: OutboundChannel = Channel::new();
    pub static BUTTON_EDGES: EdgeChannel = Channel::new();
    pub static INTERACTIONS: InteractionChannel = Channel::new();
    pub static CONTROL_REQUESTS: ControlRequestChannel = Channel::new();
    pub static SETTINGS_REQUESTS: SettingsChannel = Channel::new();

    /// Settings revision the credentials watch ignores; signalling restarts the watch.
    pub static WATCH_BASELINE: Signal<BridgeMutex, u32> = Signal::new();

    /// Discards anything queued between the bridge and the control task.
    pub fn drain_bridge_channels() {
        INBOUND.clear();
        OUTBOUND.clear();
    }
}

#[cfg(target_os = "none")]
pub use queues::*;
