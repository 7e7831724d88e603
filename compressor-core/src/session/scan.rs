//! Top-K table of networks seen during the provisioning scan.

use heapless::{String, Vec};
use serde::Serialize;

use crate::settings::{AuthKind, SSID_MAX_LEN};

/// Networks retained for the provisioning page.
pub const SCAN_TABLE_LEN: usize = 10;

/// One network heard during a scan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub ssid: String<SSID_MAX_LEN>,
    /// Signal strength in dBm.
    pub rssi: i16,
    #[serde(rename = "authMode")]
    pub auth: AuthKind,
}

/// Strongest supported networks, one entry per name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanTable {
    entries: Vec<ScanResult, SCAN_TABLE_LEN>,
}

impl ScanTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[ScanResult] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Offers a scan result. Returns `true` when the table changed.
    ///
    /// Hidden or unsupported networks are ignored, a stronger sighting of a
    /// known name updates it in place, and a new name evicts the weakest
    /// entry once the table is full.
    pub fn offer(&mut self, result: ScanResult) -> bool {
        if result.ssid.is_empty() || !result.auth.is_supported() {
            return false;
        }

        let mut weakest: Option<(usize, i16)> = None;
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if entry.ssid == result.ssid {
                if result.rssi > entry.rssi {
                    entry.rssi = result.rssi;
                    entry.auth = result.auth;
                    return true;
                }
                return false;
            }
            if weakest.is_none_or(|(_, rssi)| entry.rssi < rssi) {
                weakest = Some((index, entry.rssi));
            }
        }

        match self.entries.push(result) {
            Ok(()) => true,
            Err(result) => match weakest {
                Some((index, rssi)) if result.rssi > rssi => {
                    self.entries[index] = result;
                    true
                }
                _ => false,
            },
        }
    }

    /// Orders entries strongest first for display.
    pub fn sort_by_strength(&mut self) {
        self.entries.sort_unstable_by(|a, b| b.rssi.cmp(&a.rssi));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(ssid: &str, rssi: i16) -> ScanResult {
        ScanResult {
            ssid: String::try_from(ssid).unwrap(),
            rssi,
            auth: AuthKind::Wpa2Aes,
        }
    }

    const NAMES: [&str; 12] = [
        "n0", "n1", "n2", "n3", "n4", "n5", "n6", "n7", "n8", "n9", "n10", "n11",
    ];

    #[test]
    fn ignores_hidden_and_unsupported_networks() {
        let mut table = ScanTable::new();
        assert!(!table.offer(network("", -40)));
        let mut open = network("cafe", -30);
        open.auth = AuthKind::Open;
        assert!(!table.offer(open));
        assert!(table.is_empty());
    }

    #[test]
    fn stronger_duplicate_updates_in_place() {
        let mut table = ScanTable::new();
        table.offer(network("home", -70));
        assert!(!table.offer(network("home", -80)));
        assert!(table.offer(network("home", -50)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.entries()[0].rssi, -50);
    }

    #[test]
    fn full_table_evicts_weakest_for_stronger_newcomer() {
        let mut table = ScanTable::new();
        for (offset, name) in NAMES.iter().take(SCAN_TABLE_LEN).enumerate() {
            let rssi = -60 - i16::try_from(offset).unwrap();
            table.offer(network(name, rssi));
        }
        assert_eq!(table.len(), SCAN_TABLE_LEN);

        assert!(!table.offer(network(NAMES[10], -90)));
        assert!(table.offer(network(NAMES[11], -55)));
        assert_eq!(table.len(), SCAN_TABLE_LEN);
        assert!(table.entries().iter().all(|entry| entry.ssid != "n9"));

        table.sort_by_strength();
        assert_eq!(table.entries()[0].ssid, "n11");
    }
}
