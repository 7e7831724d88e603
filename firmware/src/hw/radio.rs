//! CYW43439 station and access-point control.

use compressor_core::provisioning::DhcpServerConfig;
use compressor_core::session::{ScanResult, WifiRadio};
use compressor_core::settings::{AuthKind, Credentials};
use cyw43::{Control, JoinAuth, JoinOptions, ScanOptions};
use embassy_net::{ConfigV4, DhcpConfig, Ipv4Address, Ipv4Cidr, Stack, StaticConfigV4};
use embassy_time::{Duration, with_timeout};
use heapless::String;

/// Channel the provisioning network is advertised on.
const AP_CHANNEL: u8 = 6;

const AP_SSID: &str = env!("COMPRESSOR_AP_SSID");
const AP_PASSWORD: &str = env!("COMPRESSOR_AP_PASSWORD");

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum RadioError {
    Join,
    Timeout,
}

/// Radio control plus the network stack it feeds.
pub struct CywRadio {
    control: Control<'static>,
    stack: Stack<'static>,
}

impl CywRadio {
    #[must_use]
    pub fn new(control: Control<'static>, stack: Stack<'static>) -> Self {
        Self { control, stack }
    }
}

fn join_options(password: &str, auth: AuthKind) -> JoinOptions<'_> {
    let mut options = JoinOptions::new(password.as_bytes());
    match auth {
        AuthKind::Open => return JoinOptions::new_open(),
        AuthKind::WpaTkip => {
            options.auth = JoinAuth::Wpa;
            options.cipher_aes = false;
        }
        AuthKind::Wpa2Aes | AuthKind::Wpa2Mixed => options.auth = JoinAuth::Wpa2,
        AuthKind::Wpa3Sae => options.auth = JoinAuth::Wpa3,
        AuthKind::Wpa3Wpa2 => options.auth = JoinAuth::Wpa2Wpa3,
    }
    options
}

fn access_point_config() -> StaticConfigV4 {
    let [a, b, c, d] = DhcpServerConfig::DEFAULT.server;
    StaticConfigV4 {
        address: Ipv4Cidr::new(Ipv4Address::new(a, b, c, d), 24),
        gateway: None,
        dns_servers: Default::default(),
    }
}

impl WifiRadio for CywRadio {
    type Error = RadioError;

    async fn enable_station(&mut self) {
        self.stack
            .set_config_v4(ConfigV4::Dhcp(DhcpConfig::default()));
    }

    async fn disable_station(&mut self) {
        self.control.leave().await;
        self.stack.set_config_v4(ConfigV4::None);
    }

    async fn join(&mut self, credentials: &Credentials, timeout_ms: u32) -> Result<(), RadioError> {
        let control = &mut self.control;
        let stack = self.stack;
        let attempt = async {
            let mut joined = Err(RadioError::Join);
            for &auth in credentials.auth.join_candidates() {
                let options = join_options(&credentials.password, auth);
                match control.join(&credentials.ssid, options).await {
                    Ok(()) => {
                        joined = Ok(());
                        break;
                    }
                    Err(_) => defmt::debug!("radio: join as {} refused", auth),
                }
            }
            joined?;
            stack.wait_config_up().await;
            Ok::<(), RadioError>(())
        };
        with_timeout(Duration::from_millis(u64::from(timeout_ms)), attempt)
            .await
            .map_err(|_| RadioError::Timeout)?
    }

    async fn leave(&mut self) {
        self.control.leave().await;
    }

    async fn link_up(&mut self) -> bool {
        self.stack.is_link_up()
    }

    async fn scan<F>(&mut self, mut on_result: F) -> Result<(), RadioError>
    where
        F: FnMut(ScanResult),
    {
        let mut scanner = self.control.scan(ScanOptions::default()).await;
        while let Some(bss) = scanner.next().await {
            let len = usize::from(bss.ssid_len).min(bss.ssid.len());
            let Ok(name) = core::str::from_utf8(&bss.ssid[..len]) else {
                continue;
            };
            let Ok(ssid) = String::try_from(name) else {
                continue;
            };
            let auth = AuthKind::from_capability(bss.capability);
            on_result(ScanResult {
                ssid,
                rssi: bss.rssi,
                auth,
            });
        }
        Ok(())
    }

    async fn start_access_point(&mut self) -> Result<(), RadioError> {
        self.control
            .start_ap_wpa2(AP_SSID, AP_PASSWORD, AP_CHANNEL)
            .await;
        self.stack
            .set_config_v4(ConfigV4::Static(access_point_config()));
        defmt::info!("radio: access point {} up", AP_SSID);
        Ok(())
    }

    async fn stop_access_point(&mut self) {
        self.control.close_ap().await;
        self.stack.set_config_v4(ConfigV4::None);
    }
}
