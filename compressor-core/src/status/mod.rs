//! Connectivity status flags shared between tasks.
//!
//! Each flag has exactly one writer. The session manager writes the Wi-Fi and
//! provisioning flags through a [`SessionStatus`] token, the socket bridge
//! writes the socket flags through a [`BridgeStatus`] token, and each token can
//! be claimed only once. Everyone else reads a [`StatusSnapshot`].

use portable_atomic::{AtomicBool, AtomicU32, Ordering};

/// Single-writer connectivity flags.
pub struct LinkStatus {
    client_connecting: AtomicBool,
    wifi_connected: AtomicBool,
    access_point_active: AtomicBool,
    bridge_active: AtomicBool,
    socket_connected: AtomicBool,
    bridge_sessions: AtomicU32,
    session_claimed: AtomicBool,
    bridge_claimed: AtomicBool,
}

/// Point-in-time copy of every flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusSnapshot {
    pub client_connecting: bool,
    pub wifi_connected: bool,
    pub access_point_active: bool,
    pub bridge_active: bool,
    pub socket_connected: bool,
    /// Count of bridge sessions that reached the remote peer.
    pub bridge_sessions: u32,
}

impl LinkStatus {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            client_connecting: AtomicBool::new(false),
            wifi_connected: AtomicBool::new(false),
            access_point_active: AtomicBool::new(false),
            bridge_active: AtomicBool::new(false),
            socket_connected: AtomicBool::new(false),
            bridge_sessions: AtomicU32::new(0),
            session_claimed: AtomicBool::new(false),
            bridge_claimed: AtomicBool::new(false),
        }
    }

    /// Claims the session-manager writer. Returns `None` once claimed.
    pub fn session_writer(&self) -> Option<SessionStatus<'_>> {
        (!self.session_claimed.swap(true, Ordering::AcqRel)).then_some(SessionStatus { link: self })
    }

    /// Claims the bridge writer. Returns `None` once claimed.
    pub fn bridge_writer(&self) -> Option<BridgeStatus<'_>> {
        (!self.bridge_claimed.swap(true, Ordering::AcqRel)).then_some(BridgeStatus { link: self })
    }

    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            client_connecting: self.client_connecting.load(Ordering::Acquire),
            wifi_connected: self.wifi_connected.load(Ordering::Acquire),
            access_point_active: self.access_point_active.load(Ordering::Acquire),
            bridge_active: self.bridge_active.load(Ordering::Acquire),
            socket_connected: self.socket_connected.load(Ordering::Acquire),
            bridge_sessions: self.bridge_sessions.load(Ordering::Acquire),
        }
    }
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Write access to the flags owned by the session manager.
pub struct SessionStatus<'a> {
    link: &'a LinkStatus,
}

impl SessionStatus<'_> {
    pub fn set_client_connecting(&self, value: bool) {
        self.link.client_connecting.store(value, Ordering::Release);
    }

    pub fn set_wifi_connected(&self, value: bool) {
        self.link.wifi_connected.store(value, Ordering::Release);
    }

    pub fn set_access_point_active(&self, value: bool) {
        self.link.access_point_active.store(value, Ordering::Release);
    }

    pub fn set_bridge_active(&self, value: bool) {
        self.link.bridge_active.store(value, Ordering::Release);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        self.link.snapshot()
    }
}

/// Write access to the flags owned by the socket bridge.
pub struct BridgeStatus<'a> {
    link: &'a LinkStatus,
}

impl BridgeStatus<'_> {
    /// Marks the peer reachable and counts the session.
    pub fn record_connected(&self) {
        self.link.socket_connected.store(true, Ordering::Release);
        self.link.bridge_sessions.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_disconnected(&self) {
        self.link.socket_connected.store(false, Ordering::Release);
    }
}

/// Colour shown on the status pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IndicatorColor {
    Off,
    White,
    Blue,
    Yellow,
    Green,
}

impl IndicatorColor {
    /// RGB triple for the pixel driver.
    #[must_use]
    pub const fn rgb(self) -> (u8, u8, u8) {
        match self {
            Self::Off => (0, 0, 0),
            Self::White => (0xFF, 0xFF, 0xFF),
            Self::Blue => (0, 0, 0xFF),
            Self::Yellow => (0xFF, 0xFF, 0),
            Self::Green => (0, 0xFF, 0),
        }
    }
}

/// Maps the flags to a colour; `blink_phase` alternates once per poll.
#[must_use]
pub fn indicator_color(status: &StatusSnapshot, blink_phase: bool) -> IndicatorColor {
    if status.socket_connected {
        IndicatorColor::Green
    } else if status.wifi_connected {
        IndicatorColor::Yellow
    } else if status.client_connecting {
        if blink_phase {
            IndicatorColor::Yellow
        } else {
            IndicatorColor::Off
        }
    } else if status.access_point_active {
        IndicatorColor::Blue
    } else {
        IndicatorColor::White
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_tokens_are_single_use() {
        let link = LinkStatus::new();
        assert!(link.session_writer().is_some());
        assert!(link.session_writer().is_none());
        assert!(link.bridge_writer().is_some());
        assert!(link.bridge_writer().is_none());
    }

    #[test]
    fn bridge_sessions_count_connects() {
        let link = LinkStatus::new();
        let bridge = link.bridge_writer().unwrap();
        bridge.record_connected();
        bridge.record_disconnected();
        bridge.record_connected();
        let snapshot = link.snapshot();
        assert!(snapshot.socket_connected);
        assert_eq!(snapshot.bridge_sessions, 2);
    }

    #[test]
    fn indicator_prefers_most_connected_state() {
        let mut status = StatusSnapshot {
            access_point_active: true,
            ..StatusSnapshot::default()
        };
        assert_eq!(indicator_color(&status, true), IndicatorColor::Blue);
        status.client_connecting = true;
        assert_eq!(indicator_color(&status, true), IndicatorColor::Yellow);
        assert_eq!(indicator_color(&status, false), IndicatorColor::Off);
        status.wifi_connected = true;
        status.socket_connected = true;
        assert_eq!(indicator_color(&status, false), IndicatorColor::Green);
        assert_eq!(
            indicator_color(&StatusSnapshot::default(), false),
            IndicatorColor::White
        );
    }
}
