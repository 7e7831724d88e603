//! Connectivity session manager.
//!
//! The manager owns Wi-Fi mode selection: it joins the configured network,
//! falls back to a self-hosted provisioning network when that fails, and
//! starts the socket bridge once the station is up. It sleeps on a
//! [`WakeSignal`] and handles every pending [`WakeReason`] in priority order
//! on each wake, so a failure path settles before a new connect starts.
//!
//! Hardware and task plumbing stay behind [`WifiRadio`] and [`SessionHost`].

pub mod backoff;
pub mod scan;
pub mod wake;

use core::fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;

use crate::config::{BackoffConfig, SessionConfig};
use crate::settings::{Credentials, SharedSettings};
use crate::status::{SessionStatus, StatusSnapshot};
use crate::time::duration_ms;

pub use backoff::SocketBackoff;
pub use scan::{SCAN_TABLE_LEN, ScanResult, ScanTable};
pub use wake::{WakeReason, WakeReasons, WakeSignal};

/// Observable connectivity phase, derived from pending reasons and flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectivityState {
    Startup,
    ClientConnecting,
    ProvisioningFallback,
    AwaitingCredentials,
    ClientConnected,
    SocketActive,
    SocketDisconnected,
}

impl ConnectivityState {
    /// Derives the phase from the reasons still pending and the status flags.
    #[must_use]
    pub fn derive(pending: WakeReasons, status: &StatusSnapshot) -> Self {
        if pending.contains(WakeReason::Startup) {
            Self::Startup
        } else if status.client_connecting {
            Self::ClientConnecting
        } else if pending.contains(WakeReason::CredentialsConfigured) {
            Self::AwaitingCredentials
        } else if status.access_point_active || pending.contains(WakeReason::ConnectionFailed) {
            Self::ProvisioningFallback
        } else if status.socket_connected {
            Self::SocketActive
        } else if pending.contains(WakeReason::SocketDisconnected) {
            Self::SocketDisconnected
        } else if status.wifi_connected {
            if status.bridge_active || pending.contains(WakeReason::ClientConnected) {
                Self::ClientConnected
            } else {
                Self::SocketDisconnected
            }
        } else {
            Self::Startup
        }
    }
}

/// Station and access-point control.
#[allow(async_fn_in_trait)]
pub trait WifiRadio {
    type Error: fmt::Debug;

    /// Switches the radio into station mode.
    async fn enable_station(&mut self);

    async fn disable_station(&mut self);

    /// Joins a network, giving up after `timeout_ms`.
    async fn join(&mut self, credentials: &Credentials, timeout_ms: u32) -> Result<(), Self::Error>;

    async fn leave(&mut self);

    /// Whether the station link is still associated.
    async fn link_up(&mut self) -> bool;

    /// Scans once, passing every network heard to `on_result`.
    async fn scan<F>(&mut self, on_result: F) -> Result<(), Self::Error>
    where
        F: FnMut(ScanResult);

    /// Brings up the provisioning network with its DHCP and HTTP services.
    async fn start_access_point(&mut self) -> Result<(), Self::Error>;

    async fn stop_access_point(&mut self);
}

/// Failure to spawn a bridge instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LaunchError;

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("bridge task could not be spawned")
    }
}

/// Task-level collaborators the manager drives.
pub trait SessionHost {
    /// Stored credentials, when both name and passphrase are set.
    fn credentials(&self) -> Option<Credentials>;

    /// Revision of the published settings snapshot.
    fn settings_revision(&self) -> u32;

    /// Asks the settings task to forget the credentials.
    fn request_credentials_reset(&mut self);

    /// Publishes the scan table for the provisioning page.
    fn publish_scan(&mut self, table: &ScanTable);

    /// Starts the credentials watch; it ignores snapshots at `baseline_revision`.
    fn start_credentials_watch(&mut self, baseline_revision: u32);

    /// Discards anything queued on the bridge channels.
    fn drain_bridge_channels(&mut self);

    /// Spawns a new bridge instance.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError`] when the bridge task cannot be spawned.
    fn launch_bridge(&mut self) -> Result<(), LaunchError>;
}

/// Orchestrates Wi-Fi modes and the bridge lifecycle.
pub struct SessionManager<'a, R, H, D> {
    radio: R,
    host: H,
    delay: D,
    wake: &'a WakeSignal,
    status: SessionStatus<'a>,
    config: SessionConfig,
    backoff: SocketBackoff,
    seen_bridge_sessions: u32,
    scan: ScanTable,
}

impl<'a, R, H, D> SessionManager<'a, R, H, D>
where
    R: WifiRadio,
    H: SessionHost,
    D: DelayNs,
{
    pub fn new(
        radio: R,
        host: H,
        delay: D,
        wake: &'a WakeSignal,
        status: SessionStatus<'a>,
        config: SessionConfig,
        backoff: BackoffConfig,
    ) -> Self {
        let seen_bridge_sessions = status.snapshot().bridge_sessions;
        Self {
            radio,
            host,
            delay,
            wake,
            status,
            config,
            backoff: SocketBackoff::new(backoff),
            seen_bridge_sessions,
            scan: ScanTable::new(),
        }
    }

    #[must_use]
    pub fn radio(&self) -> &R {
        &self.radio
    }

    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    #[must_use]
    pub fn delay(&self) -> &D {
        &self.delay
    }

    #[must_use]
    pub fn backoff(&self) -> &SocketBackoff {
        &self.backoff
    }

    #[must_use]
    pub fn scan_table(&self) -> &ScanTable {
        &self.scan
    }

    /// Current phase given whatever is still pending on the wake signal.
    #[must_use]
    pub fn state(&self) -> ConnectivityState {
        ConnectivityState::derive(self.wake.peek(), &self.status.snapshot())
    }

    /// Raises `Startup` and services wakes forever.
    pub async fn run(&mut self) -> ! {
        self.wake.raise(WakeReason::Startup);
        loop {
            let reasons = self.wake.wait().await;
            self.dispatch(reasons).await;
        }
    }

    /// Takes whatever is pending and handles it. Returns the handled set.
    pub async fn step(&mut self) -> WakeReasons {
        let reasons = self.wake.take();
        self.dispatch(reasons).await;
        reasons
    }

    /// Handles every reason in `reasons` in priority order.
    pub async fn dispatch(&mut self, reasons: WakeReasons) {
        for reason in reasons.iter() {
            debug!("session: handling {}", reason);
            match reason {
                WakeReason::Startup => self.on_startup().await,
                WakeReason::ConnectionFailed => self.on_connection_failed().await,
                WakeReason::CredentialsConfigured => self.on_credentials_configured().await,
                WakeReason::ClientConnected => self.on_client_connected(),
                WakeReason::SocketDisconnected => self.on_socket_disconnected().await,
                WakeReason::ForgetNetwork => self.on_forget_network().await,
            }
        }
    }

    async fn on_startup(&mut self) {
        self.radio.enable_station().await;
        let Some(credentials) = self.host.credentials() else {
            info!("session: no stored credentials");
            self.wake.raise(WakeReason::ConnectionFailed);
            return;
        };
        if self.connect(&credentials).await {
            self.wake.raise(WakeReason::ClientConnected);
        } else {
            warn!("session: stored network unreachable, keeping credentials");
            self.wake.raise(WakeReason::ConnectionFailed);
        }
    }

    async fn on_connection_failed(&mut self) {
        self.status.set_wifi_connected(false);
        if self.status.snapshot().access_point_active {
            debug!("session: provisioning already active");
        } else {
            self.scan_networks().await;
            self.radio.disable_station().await;
            match self.radio.start_access_point().await {
                Ok(()) => {
                    info!("session: provisioning network up");
                    self.status.set_access_point_active(true);
                }
                Err(_) => error!("session: provisioning network failed to start"),
            }
        }
        let baseline = self.host.settings_revision();
        self.host.start_credentials_watch(baseline);
    }

    async fn on_credentials_configured(&mut self) {
        if self.status.snapshot().access_point_active {
            self.radio.stop_access_point().await;
            self.status.set_access_point_active(false);
        }
        self.scan.clear();
        self.radio.enable_station().await;

        let Some(credentials) = self.host.credentials() else {
            warn!("session: credentials vanished before connecting");
            self.wake.raise(WakeReason::ConnectionFailed);
            return;
        };
        if self.connect(&credentials).await {
            self.wake.raise(WakeReason::ClientConnected);
        } else {
            warn!("session: new credentials rejected, forgetting them");
            self.host.request_credentials_reset();
            self.delay
                .delay_ms(duration_ms(self.config.reset_settle))
                .await;
            self.wake.raise(WakeReason::ConnectionFailed);
        }
    }

    fn on_client_connected(&mut self) {
        if self.status.snapshot().bridge_active {
            debug!("session: bridge already running");
            return;
        }

        self.host.drain_bridge_channels();
        self.status.set_bridge_active(true);
        if let Err(error) = self.host.launch_bridge() {
            warn!("session: {}", error);
            self.status.set_bridge_active(false);
            self.wake.raise(WakeReason::SocketDisconnected);
        }
    }

    async fn on_socket_disconnected(&mut self) {
        self.status.set_bridge_active(false);
        self.host.drain_bridge_channels();

        let sessions = self.status.snapshot().bridge_sessions;
        if sessions != self.seen_bridge_sessions {
            self.seen_bridge_sessions = sessions;
            self.backoff.reset();
        }

        if !self.radio.link_up().await {
            info!("session: wifi link lost");
            self.status.set_wifi_connected(false);
            self.backoff.reset();
            self.wake.raise(WakeReason::Startup);
            return;
        }

        let delay_ms = self.backoff.next_delay_ms();
        info!("session: bridge retry in {} ms", delay_ms);
        self.delay.delay_ms(delay_ms).await;
        self.wake.raise(WakeReason::ClientConnected);
    }

    async fn on_forget_network(&mut self) {
        info!("session: forgetting network");
        self.radio.leave().await;
        self.status.set_wifi_connected(false);
    }

    async fn connect(&mut self, credentials: &Credentials) -> bool {
        let attempts = self.config.connect_attempts;
        let timeout_ms = duration_ms(self.config.connect_timeout);

        for attempt in 1..=attempts {
            info!("session: joining network (attempt {} of {})", attempt, attempts);
            self.status.set_client_connecting(true);
            let joined = self.radio.join(credentials, timeout_ms).await;
            self.status.set_client_connecting(false);

            if joined.is_ok() {
                info!("session: joined network");
                self.status.set_wifi_connected(true);
                self.backoff.reset();
                return true;
            }

            warn!("session: join attempt {} failed", attempt);
            self.radio.leave().await;
            if attempt < attempts {
                self.delay
                    .delay_ms(duration_ms(self.config.retry_delay))
                    .await;
            }
        }

        false
    }

    async fn scan_networks(&mut self) {
        self.scan.clear();
        let table = &mut self.scan;
        if self
            .radio
            .scan(|result| {
                table.offer(result);
            })
            .await
            .is_err()
        {
            warn!("session: scan failed");
        }
        self.scan.sort_by_strength();
        info!("session: scan kept {} networks", self.scan.len());
        self.host.publish_scan(&self.scan);
    }
}

/// Polls the settings snapshot until credentials newer than
/// `baseline_revision` are complete, then raises `CredentialsConfigured`.
pub async fn watch_credentials<M, D>(
    settings: &SharedSettings<M>,
    wake: &WakeSignal,
    delay: &mut D,
    config: &SessionConfig,
    baseline_revision: u32,
) where
    M: RawMutex,
    D: DelayNs,
{
    let poll_ms = duration_ms(config.credential_poll);
    loop {
        let snapshot = settings.snapshot();
        if snapshot.revision != baseline_revision && snapshot.settings.credentials.is_complete() {
            info!("session: credentials configured");
            wake.raise(WakeReason::CredentialsConfigured);
            return;
        }
        delay.delay_ms(poll_ms).await;
    }
}
