#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared connectivity state for the firmware target.
//!
//! The link flags and the wake signal are lock-free; the settings snapshot
//! and the provisioning scan table sit behind the task-local mutex so the
//! HTTP server and the session manager never share mutable state directly.

use compressor_core::session::WakeSignal;
use compressor_core::status::LinkStatus;

/// Connectivity flags; writers are claimed once during bring-up.
pub static LINK: LinkStatus = LinkStatus::new();

/// Wake reasons for the session manager.
pub static WAKE: WakeSignal = WakeSignal::new();

#[cfg(target_os = "none")]
mod shared {
    use core::cell::RefCell;

    use compressor_core::session::ScanTable;
    use compressor_core::settings::SharedSettings;
    use embassy_sync::blocking_mutex::Mutex;

    use crate::channels::BridgeMutex;

    /// Latest settings published by the settings task.
    pub static SETTINGS: SharedSettings<BridgeMutex> = SharedSettings::new();

    static SCAN: Mutex<BridgeMutex, RefCell<ScanTable>> = Mutex::new(RefCell::new(ScanTable::new()));

    /// Replaces the table served at `/scan.json`.
    pub fn publish_scan(table: &ScanTable) {
        SCAN.lock(|cell| cell.borrow_mut().clone_from(table));
    }

    /// Copy of the most recent scan.
    pub fn scan_table() -> ScanTable {
        SCAN.lock(|cell| cell.borrow().clone())
    }
}

#[cfg(target_os = "none")]
pub use shared::*;
