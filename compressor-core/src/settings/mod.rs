//! Persisted device settings.
//!
//! The settings task owns the authoritative copy and the flash record
//! ([`SettingsService`]). Everyone else reads the [`SharedSettings`] snapshot
//! and asks for changes with [`SettingsRequest`]s.

mod record;
mod shared;

use core::fmt;

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::protocol::TimerChannel;

pub use record::{PersistError, RECORD_LEN, SETTINGS_MAGIC, SettingsService, SettingsStore};
pub use shared::{SettingsSnapshot, SharedSettings};

/// Longest network name accepted.
pub const SSID_MAX_LEN: usize = 32;
/// Longest passphrase accepted.
pub const PASSWORD_MAX_LEN: usize = 64;

/// Privacy bit of the 802.11 capability field.
pub const CAPABILITY_PRIVACY: u16 = 0x0010;

/// Wi-Fi security kinds, numbered as the provisioning page submits them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AuthKind {
    #[default]
    Open,
    WpaTkip,
    Wpa2Mixed,
    Wpa3Sae,
    Wpa3Wpa2,
    Wpa2Aes,
}

impl AuthKind {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::WpaTkip => 1,
            Self::Wpa2Mixed => 3,
            Self::Wpa3Sae => 4,
            Self::Wpa3Wpa2 => 5,
            Self::Wpa2Aes => 7,
        }
    }

    /// Maps a submitted code; unknown codes fall back to [`AuthKind::Open`].
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => Self::WpaTkip,
            3 => Self::Wpa2Mixed,
            4 => Self::Wpa3Sae,
            5 => Self::Wpa3Wpa2,
            7 => Self::Wpa2Aes,
            _ => Self::Open,
        }
    }

    /// Security kinds the station can join with a passphrase and that the
    /// scan table offers.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        matches!(self, Self::WpaTkip | Self::Wpa2Aes | Self::Wpa2Mixed)
    }

    /// Classifies a scanned network from its capability field.
    ///
    /// Scan results carry the privacy bit but not the advertised suites, so a
    /// secured network reports [`AuthKind::Wpa2Mixed`] and the join works the
    /// suite out through [`AuthKind::join_candidates`].
    #[must_use]
    pub const fn from_capability(capability: u16) -> Self {
        if capability & CAPABILITY_PRIVACY == 0 {
            Self::Open
        } else {
            Self::Wpa2Mixed
        }
    }

    /// Kinds tried in order when joining a network saved as `self`.
    #[must_use]
    pub const fn join_candidates(self) -> &'static [Self] {
        match self {
            Self::Open => &[Self::Open],
            Self::WpaTkip => &[Self::WpaTkip],
            Self::Wpa2Mixed => &[Self::Wpa2Aes, Self::Wpa3Wpa2, Self::WpaTkip],
            Self::Wpa3Sae => &[Self::Wpa3Sae],
            Self::Wpa3Wpa2 => &[Self::Wpa3Wpa2],
            Self::Wpa2Aes => &[Self::Wpa2Aes],
        }
    }
}

impl From<u8> for AuthKind {
    fn from(code: u8) -> Self {
        Self::from_code(code)
    }
}

impl From<AuthKind> for u8 {
    fn from(kind: AuthKind) -> Self {
        kind.code()
    }
}

/// Client-mode network credentials.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub ssid: String<SSID_MAX_LEN>,
    pub password: String<PASSWORD_MAX_LEN>,
    pub auth: AuthKind,
}

impl Credentials {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            auth: AuthKind::Open,
        }
    }

    /// Builds credentials, rejecting over-long fields.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError`] naming the field that does not fit.
    pub fn new(ssid: &str, password: &str, auth: AuthKind) -> Result<Self, CredentialsError> {
        let ssid = String::try_from(ssid).map_err(|_| CredentialsError::SsidTooLong)?;
        let password =
            String::try_from(password).map_err(|_| CredentialsError::PasswordTooLong)?;
        Ok(Self {
            ssid,
            password,
            auth,
        })
    }

    /// Both the network name and the passphrase are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.ssid.is_empty() && !self.password.is_empty()
    }
}

/// Field that failed [`Credentials::new`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CredentialsError {
    SsidTooLong,
    PasswordTooLong,
}

impl fmt::Display for CredentialsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidTooLong => write!(f, "ssid longer than {SSID_MAX_LEN} bytes"),
            Self::PasswordTooLong => write!(f, "password longer than {PASSWORD_MAX_LEN} bytes"),
        }
    }
}

/// Countdown timeouts in minutes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timeouts {
    pub compression: u32,
    pub supply: u32,
    pub motor: u32,
}

impl Timeouts {
    pub const DEFAULT: Self = Self {
        compression: 60,
        supply: 5,
        motor: 2,
    };

    #[must_use]
    pub const fn minutes(&self, channel: TimerChannel) -> u32 {
        match channel {
            TimerChannel::Compression => self.compression,
            TimerChannel::Supply => self.supply,
            TimerChannel::Motor => self.motor,
        }
    }

    pub fn set(&mut self, channel: TimerChannel, minutes: u32) {
        match channel {
            TimerChannel::Compression => self.compression = minutes,
            TimerChannel::Supply => self.supply = minutes,
            TimerChannel::Motor => self.motor = minutes,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Everything persisted across restarts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub credentials: Credentials,
    pub timeouts: Timeouts,
}

impl Settings {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            credentials: Credentials::empty(),
            timeouts: Timeouts::DEFAULT,
        }
    }
}

/// Change requested of the settings task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettingsRequest {
    /// Store credentials submitted through provisioning.
    SetCredentials(Credentials),
    /// Store a countdown timeout.
    SetTimeout(TimerChannel, u32),
    /// Forget credentials; timeouts are kept.
    Reset,
}

impl SettingsRequest {
    /// Applies the request to `settings`.
    pub fn apply_to(&self, settings: &mut Settings) {
        match self {
            Self::SetCredentials(credentials) => settings.credentials = credentials.clone(),
            Self::SetTimeout(channel, minutes) => settings.timeouts.set(*channel, *minutes),
            Self::Reset => settings.credentials = Credentials::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_codes_round_trip() {
        for kind in [
            AuthKind::Open,
            AuthKind::WpaTkip,
            AuthKind::Wpa2Mixed,
            AuthKind::Wpa3Sae,
            AuthKind::Wpa3Wpa2,
            AuthKind::Wpa2Aes,
        ] {
            assert_eq!(AuthKind::from_code(kind.code()), kind);
        }
        assert_eq!(AuthKind::from_code(42), AuthKind::Open);
    }

    #[test]
    fn secured_scan_results_negotiate_the_suite() {
        assert_eq!(AuthKind::from_capability(0x0401), AuthKind::Open);
        let secured = AuthKind::from_capability(0x0411);
        assert_eq!(secured, AuthKind::Wpa2Mixed);
        assert_eq!(
            secured.join_candidates(),
            &[AuthKind::Wpa2Aes, AuthKind::Wpa3Wpa2, AuthKind::WpaTkip]
        );
        assert_eq!(AuthKind::Wpa2Aes.join_candidates(), &[AuthKind::Wpa2Aes]);
        assert!(!AuthKind::from_capability(0x0001).is_supported());
    }

    #[test]
    fn reset_keeps_timeouts() {
        let mut settings = Settings::new();
        SettingsRequest::SetCredentials(
            Credentials::new("shop", "hunter22", AuthKind::Wpa2Aes).unwrap(),
        )
        .apply_to(&mut settings);
        SettingsRequest::SetTimeout(TimerChannel::Supply, 9).apply_to(&mut settings);
        assert!(settings.credentials.is_complete());

        SettingsRequest::Reset.apply_to(&mut settings);
        assert!(!settings.credentials.is_complete());
        assert_eq!(settings.timeouts.supply, 9);
    }

    #[test]
    fn rejects_oversized_fields() {
        let long = "abcdefghijklmnopqrstuvwxyz0123456";
        assert_eq!(
            Credentials::new(long, "pw", AuthKind::Open),
            Err(CredentialsError::SsidTooLong)
        );
    }
}
