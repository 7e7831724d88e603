//! Firmware side of the connectivity session manager.

use compressor_core::config::{BackoffConfig, SessionConfig};
use compressor_core::session::{self, LaunchError, ScanTable, SessionHost, SessionManager};
use compressor_core::settings::{Credentials, SettingsRequest};
use compressor_core::status::{BridgeStatus, SessionStatus};
use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_net::Stack;
use embassy_time::Delay;

use crate::channels::{self, SETTINGS_REQUESTS, WATCH_BASELINE};
use crate::hw::CywRadio;
use super::bridge_task;
use crate::status::{self, SETTINGS, WAKE};

/// Hooks the session manager uses to reach the rest of the firmware.
pub struct FirmwareHost {
    spawner: Spawner,
    stack: Stack<'static>,
    bridge_status: &'static BridgeStatus<'static>,
}

impl FirmwareHost {
    #[must_use]
    pub fn new(spawner: Spawner, stack: Stack<'static>, bridge_status: &'static BridgeStatus<'static>) -> Self {
        Self {
            spawner,
            stack,
            bridge_status,
        }
    }
}

impl SessionHost for FirmwareHost {
    fn credentials(&self) -> Option<Credentials> {
        SETTINGS.credentials()
    }

    fn settings_revision(&self) -> u32 {
        SETTINGS.revision()
    }

    fn request_credentials_reset(&mut self) {
        if SETTINGS_REQUESTS.try_send(SettingsRequest::Reset).is_err() {
            defmt::warn!("session: settings queue full, credentials not cleared");
        }
    }

    fn publish_scan(&mut self, table: &ScanTable) {
        status::publish_scan(table);
    }

    fn start_credentials_watch(&mut self, baseline_revision: u32) {
        WATCH_BASELINE.signal(baseline_revision);
    }

    fn drain_bridge_channels(&mut self) {
        channels::drain_bridge_channels();
    }

    fn launch_bridge(&mut self) -> Result<(), LaunchError> {
        let token = bridge_task::run(self.stack, self.bridge_status).map_err(|_| LaunchError)?;
        self.spawner.spawn(token);
        Ok(())
    }
}

#[embassy_executor::task]
pub async fn run(radio: CywRadio, host: FirmwareHost, status: SessionStatus<'static>) -> ! {
    let mut manager = SessionManager::new(
        radio,
        host,
        Delay,
        &WAKE,
        status,
        SessionConfig::DEFAULT,
        BackoffConfig::DEFAULT,
    );
    manager.run().await
}

/// Raises `CredentialsConfigured` once settings move past the latest baseline.
#[embassy_executor::task]
pub async fn watch_credentials() -> ! {
    let mut baseline = WATCH_BASELINE.wait().await;
    loop {
        let watch = session::watch_credentials(&SETTINGS, &WAKE, &mut Delay, &SessionConfig::DEFAULT, baseline);
        baseline = match select(watch, WATCH_BASELINE.wait()).await {
            Either::First(()) => WATCH_BASELINE.wait().await,
            Either::Second(next) => next,
        };
    }
}
