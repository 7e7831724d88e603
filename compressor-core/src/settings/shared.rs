//! Read-mostly settings snapshot shared between tasks.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;

use super::{Credentials, Settings, Timeouts};

/// Settings together with the revision they were published at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingsSnapshot {
    pub settings: Settings,
    /// Incremented on every publish.
    pub revision: u32,
}

/// Snapshot written only by the settings task and read by everyone else.
pub struct SharedSettings<M: RawMutex> {
    inner: Mutex<M, RefCell<SettingsSnapshot>>,
}

impl<M: RawMutex> SharedSettings<M> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(SettingsSnapshot {
                settings: Settings::new(),
                revision: 0,
            })),
        }
    }

    /// Replaces the snapshot and bumps the revision.
    pub fn publish(&self, settings: &Settings) {
        self.inner.lock(|cell| {
            let mut snapshot = cell.borrow_mut();
            snapshot.settings.clone_from(settings);
            snapshot.revision = snapshot.revision.wrapping_add(1);
        });
    }

    #[must_use]
    pub fn snapshot(&self) -> SettingsSnapshot {
        self.inner.lock(|cell| cell.borrow().clone())
    }

    #[must_use]
    pub fn revision(&self) -> u32 {
        self.inner.lock(|cell| cell.borrow().revision)
    }

    #[must_use]
    pub fn timeouts(&self) -> Timeouts {
        self.inner.lock(|cell| cell.borrow().settings.timeouts)
    }

    /// Returns the stored credentials when both name and passphrase are set.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        self.inner.lock(|cell| {
            let snapshot = cell.borrow();
            snapshot
                .settings
                .credentials
                .is_complete()
                .then(|| snapshot.settings.credentials.clone())
        })
    }
}

impl<M: RawMutex> Default for SharedSettings<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    use super::*;
    use crate::settings::AuthKind;

    #[test]
    fn publish_bumps_revision_and_exposes_credentials() {
        let shared = SharedSettings::<NoopRawMutex>::new();
        assert_eq!(shared.revision(), 0);
        assert_eq!(shared.credentials(), None);

        let mut settings = Settings::new();
        settings.credentials = Credentials::new("yard", "pass1234", AuthKind::Wpa2Aes).unwrap();
        shared.publish(&settings);

        assert_eq!(shared.revision(), 1);
        assert_eq!(shared.credentials(), Some(settings.credentials));
    }
}
