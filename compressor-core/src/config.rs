//! Compile-time tunables for the connectivity, bridge, and control paths.

use core::time::Duration;

/// Client-mode connection policy used by the session manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Join attempts made before falling back to provisioning.
    pub connect_attempts: u8,
    /// Upper bound on a single join attempt.
    pub connect_timeout: Duration,
    /// Pause between consecutive join attempts.
    pub retry_delay: Duration,
    /// Period of the credentials watch while provisioning.
    pub credential_poll: Duration,
    /// Settle time after requesting a credentials reset.
    pub reset_settle: Duration,
}

impl SessionConfig {
    pub const DEFAULT: Self = Self {
        connect_attempts: 3,
        connect_timeout: Duration::from_secs(30),
        retry_delay: Duration::from_secs(2),
        credential_poll: Duration::from_millis(100),
        reset_settle: Duration::from_millis(500),
    };
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Reconnect delay schedule for the socket bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BackoffConfig {
    pub initial_ms: u32,
    pub step_ms: u32,
    pub ceiling_ms: u32,
}

impl BackoffConfig {
    pub const DEFAULT: Self = Self {
        initial_ms: 5_000,
        step_ms: 5_000,
        ceiling_ms: 120_000,
    };
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Pump cadence for the socket bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Delay between bridge wakes.
    pub tick: Duration,
    /// Upper bound on handing a decoded command to the control path.
    pub send_timeout: Duration,
}

impl BridgeConfig {
    pub const DEFAULT: Self = Self {
        tick: Duration::from_millis(100),
        send_timeout: Duration::from_millis(100),
    };
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Receive buffer size for one bridge session.
pub const BRIDGE_RX_BUFFER: usize = 1024;

/// Timing for the control state machine and the button pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlConfig {
    /// How long the solenoid stays open during a release.
    pub release_dwell: Duration,
    /// Period of the progress-reporting watch timer.
    pub watch_period: Duration,
    /// Holding the shutdown button at least this long is a long press.
    pub long_press: Duration,
}

impl ControlConfig {
    pub const DEFAULT: Self = Self {
        release_dwell: Duration::from_secs(20),
        watch_period: Duration::from_secs(60),
        long_press: Duration::from_millis(500),
    };
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Depth of the inbound command channel (bridge → control).
pub const INBOUND_QUEUE_DEPTH: usize = 10;
/// Depth of the outbound info channel (control, sensors → bridge).
pub const OUTBOUND_QUEUE_DEPTH: usize = 10;
/// Depth of the interaction channel (button pipeline → interaction dispatcher).
pub const INTERACTION_QUEUE_DEPTH: usize = 10;
/// Depth of the raw button edge channel (pin watchers → button pipeline).
pub const EDGE_QUEUE_DEPTH: usize = 8;
/// Depth of the settings request channel.
pub const SETTINGS_QUEUE_DEPTH: usize = 5;
/// Depth of the local control request channel (sensors, interactions → control).
pub const CONTROL_REQUEST_DEPTH: usize = 8;
