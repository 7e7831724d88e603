use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embedded_hal_async::delay::DelayNs;

use compressor_core::config::{BackoffConfig, SessionConfig};
use compressor_core::session::{
    ConnectivityState, LaunchError, ScanResult, ScanTable, SessionHost, SessionManager,
    SocketBackoff, WakeReason, WakeSignal, WifiRadio, watch_credentials,
};
use compressor_core::settings::{AuthKind, Credentials, Settings, SharedSettings};
use compressor_core::status::LinkStatus;

#[derive(Default)]
struct Delay {
    waited_ms: Vec<u32>,
}

impl DelayNs for Delay {
    async fn delay_ns(&mut self, ns: u32) {
        self.waited_ms.push(ns / 1_000_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.waited_ms.push(ms);
    }
}

#[derive(Default)]
struct Radio {
    joins_succeed: bool,
    link_up: bool,
    join_attempts: u32,
    scans: u32,
    access_point_starts: u32,
    station_enabled: bool,
}

impl WifiRadio for Radio {
    type Error = ();

    async fn enable_station(&mut self) {
        self.station_enabled = true;
    }

    async fn disable_station(&mut self) {
        self.station_enabled = false;
    }

    async fn join(&mut self, _credentials: &Credentials, _timeout_ms: u32) -> Result<(), ()> {
        self.join_attempts += 1;
        if self.joins_succeed { Ok(()) } else { Err(()) }
    }

    async fn leave(&mut self) {}

    async fn link_up(&mut self) -> bool {
        self.link_up
    }

    async fn scan<F>(&mut self, mut on_result: F) -> Result<(), ()>
    where
        F: FnMut(ScanResult),
    {
        self.scans += 1;
        on_result(ScanResult {
            ssid: "workshop".try_into().unwrap(),
            rssi: -61,
            auth: AuthKind::Wpa2Aes,
        });
        Ok(())
    }

    async fn start_access_point(&mut self) -> Result<(), ()> {
        self.access_point_starts += 1;
        Ok(())
    }

    async fn stop_access_point(&mut self) {}
}

#[derive(Default)]
struct Host {
    credentials: Option<Credentials>,
    revision: u32,
    resets: u32,
    published: Option<ScanTable>,
    watch_baselines: Vec<u32>,
    drains: u32,
    launches: u32,
}

impl SessionHost for Host {
    fn credentials(&self) -> Option<Credentials> {
        self.credentials.clone()
    }

    fn settings_revision(&self) -> u32 {
        self.revision
    }

    fn request_credentials_reset(&mut self) {
        self.resets += 1;
        self.credentials = None;
        self.revision += 1;
    }

    fn publish_scan(&mut self, table: &ScanTable) {
        self.published = Some(table.clone());
    }

    fn start_credentials_watch(&mut self, baseline_revision: u32) {
        self.watch_baselines.push(baseline_revision);
    }

    fn drain_bridge_channels(&mut self) {
        self.drains += 1;
    }

    fn launch_bridge(&mut self) -> Result<(), LaunchError> {
        self.launches += 1;
        Ok(())
    }
}

fn stored_credentials() -> Credentials {
    Credentials::new("workshop", "compress0r", AuthKind::Wpa2Aes).unwrap()
}

#[test]
fn unreachable_stored_network_falls_back_without_forgetting() {
    let wake = WakeSignal::new();
    let link = LinkStatus::new();
    let host = Host {
        credentials: Some(stored_credentials()),
        ..Host::default()
    };
    let mut manager = SessionManager::new(
        Radio::default(),
        host,
        Delay::default(),
        &wake,
        link.session_writer().unwrap(),
        SessionConfig::DEFAULT,
        BackoffConfig::DEFAULT,
    );

    wake.raise(WakeReason::Startup);
    block_on(manager.step());
    assert_eq!(manager.radio().join_attempts, 3);
    assert_eq!(manager.host().resets, 0);
    assert!(manager.host().credentials.is_some());
    assert!(wake.peek().contains(WakeReason::ConnectionFailed));

    block_on(manager.step());
    assert_eq!(manager.state(), ConnectivityState::ProvisioningFallback);
    assert!(link.snapshot().access_point_active);
    assert!(!link.snapshot().wifi_connected);
    assert_eq!(manager.radio().access_point_starts, 1);
    assert_eq!(manager.radio().join_attempts, 3);
    assert!(manager.host().published.as_ref().is_some_and(|table| !table.is_empty()));
    assert_eq!(manager.host().watch_baselines, [0]);
}

#[test]
fn rejected_new_credentials_are_forgotten() {
    let wake = WakeSignal::new();
    let link = LinkStatus::new();
    let mut manager = SessionManager::new(
        Radio::default(),
        Host {
            credentials: Some(stored_credentials()),
            revision: 4,
            ..Host::default()
        },
        Delay::default(),
        &wake,
        link.session_writer().unwrap(),
        SessionConfig::DEFAULT,
        BackoffConfig::DEFAULT,
    );

    wake.raise(WakeReason::CredentialsConfigured);
    block_on(manager.step());
    assert_eq!(manager.radio().join_attempts, 3);
    assert_eq!(manager.host().resets, 1);
    assert!(manager.host().credentials.is_none());
    assert_eq!(manager.delay().waited_ms.last(), Some(&500));
    assert!(wake.peek().contains(WakeReason::ConnectionFailed));

    block_on(manager.step());
    assert_eq!(manager.host().watch_baselines, [5]);
}

#[test]
fn successful_join_launches_bridge() {
    let wake = WakeSignal::new();
    let link = LinkStatus::new();
    let mut manager = SessionManager::new(
        Radio {
            joins_succeed: true,
            link_up: true,
            ..Radio::default()
        },
        Host {
            credentials: Some(stored_credentials()),
            ..Host::default()
        },
        Delay::default(),
        &wake,
        link.session_writer().unwrap(),
        SessionConfig::DEFAULT,
        BackoffConfig::DEFAULT,
    );

    wake.raise(WakeReason::Startup);
    block_on(manager.step());
    assert!(link.snapshot().wifi_connected);
    assert_eq!(manager.state(), ConnectivityState::ClientConnected);

    block_on(manager.step());
    assert_eq!(manager.host().launches, 1);
    assert!(link.snapshot().bridge_active);

    // A second wake while the bridge runs does not launch another.
    wake.raise(WakeReason::ClientConnected);
    block_on(manager.step());
    assert_eq!(manager.host().launches, 1);
}

#[test]
fn socket_loss_backs_off_linearly() {
    let wake = WakeSignal::new();
    let link = LinkStatus::new();
    let mut manager = SessionManager::new(
        Radio {
            joins_succeed: true,
            link_up: true,
            ..Radio::default()
        },
        Host::default(),
        Delay::default(),
        &wake,
        link.session_writer().unwrap(),
        SessionConfig::DEFAULT,
        BackoffConfig::DEFAULT,
    );

    for expected in [5_000, 10_000, 15_000] {
        wake.raise(WakeReason::SocketDisconnected);
        block_on(manager.step());
        assert!(wake.take().contains(WakeReason::ClientConnected));
        assert_eq!(manager.backoff().peek_ms(), expected + 5_000);
    }
}

#[test]
fn bridge_session_resets_the_retry_delay() {
    let wake = WakeSignal::new();
    let link = LinkStatus::new();
    let bridge = link.bridge_writer().unwrap();
    let mut manager = SessionManager::new(
        Radio {
            link_up: true,
            ..Radio::default()
        },
        Host::default(),
        Delay::default(),
        &wake,
        link.session_writer().unwrap(),
        SessionConfig::DEFAULT,
        BackoffConfig::DEFAULT,
    );

    let mut retry = || {
        wake.raise(WakeReason::SocketDisconnected);
        block_on(manager.step());
        assert!(wake.take().contains(WakeReason::ClientConnected));
        manager.delay().waited_ms.last().copied()
    };

    // Failed launches keep growing the delay.
    assert_eq!(retry(), Some(5_000));
    assert_eq!(retry(), Some(10_000));
    assert_eq!(retry(), Some(15_000));

    // A session that reached the peer starts the schedule over.
    bridge.record_connected();
    bridge.record_disconnected();
    assert_eq!(retry(), Some(5_000));
    assert_eq!(retry(), Some(10_000));
}

#[test]
fn lost_link_restarts_from_startup() {
    let wake = WakeSignal::new();
    let link = LinkStatus::new();
    let mut manager = SessionManager::new(
        Radio::default(),
        Host::default(),
        Delay::default(),
        &wake,
        link.session_writer().unwrap(),
        SessionConfig::DEFAULT,
        BackoffConfig::DEFAULT,
    );

    wake.raise(WakeReason::SocketDisconnected);
    block_on(manager.step());
    assert_eq!(wake.take().iter().collect::<Vec<_>>(), [WakeReason::Startup]);
}

#[test]
fn backoff_delays_follow_linear_schedule() {
    let config = BackoffConfig::DEFAULT;
    let mut backoff = SocketBackoff::new(config);
    for attempt in 1..=40u32 {
        let expected = (5_000 + 5_000 * (attempt - 1)).min(120_000);
        assert_eq!(backoff.next_delay_ms(), expected);
    }
    backoff.reset();
    assert_eq!(backoff.next_delay_ms(), 5_000);
}

#[test]
fn credentials_watch_ignores_baseline_revision() {
    let settings = SharedSettings::<NoopRawMutex>::new();
    let wake = WakeSignal::new();
    let config = SessionConfig::DEFAULT;

    let mut configured = Settings::new();
    configured.credentials = stored_credentials();
    settings.publish(&configured);

    let mut delay = Delay::default();
    block_on(watch_credentials(&settings, &wake, &mut delay, &config, 0));
    assert!(wake.take().contains(WakeReason::CredentialsConfigured));
    assert!(delay.waited_ms.is_empty());
}

/// Publishes `configured` on the `publish_on`th poll.
struct PublishOnPoll<'a> {
    settings: &'a SharedSettings<NoopRawMutex>,
    configured: Settings,
    publish_on: u32,
    polls: u32,
    waited_ms: Vec<u32>,
}

impl DelayNs for PublishOnPoll<'_> {
    async fn delay_ns(&mut self, ns: u32) {
        self.delay_ms(ns / 1_000_000).await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.polls += 1;
        self.waited_ms.push(ms);
        assert!(self.polls <= self.publish_on, "watch kept polling");
        if self.polls == self.publish_on {
            self.settings.publish(&self.configured);
        }
    }
}

#[test]
fn credentials_watch_waits_past_unchanged_revision() {
    let settings = SharedSettings::<NoopRawMutex>::new();
    let wake = WakeSignal::new();
    let config = SessionConfig::DEFAULT;

    let mut configured = Settings::new();
    configured.credentials = stored_credentials();
    settings.publish(&configured);
    let baseline = settings.revision();

    let mut delay = PublishOnPoll {
        settings: &settings,
        configured,
        publish_on: 3,
        polls: 0,
        waited_ms: Vec::new(),
    };
    block_on(watch_credentials(&settings, &wake, &mut delay, &config, baseline));
    assert_eq!(delay.polls, 3);
    assert_eq!(delay.waited_ms, [100, 100, 100]);
    assert!(wake.take().contains(WakeReason::CredentialsConfigured));
}
