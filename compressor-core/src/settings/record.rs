//! Flash record layout and the settings service.
//!
//! A record is `magic (u32 LE) | length (u16 LE) | postcard payload`, padded
//! to [`RECORD_LEN`]. Anything without the magic reads as factory defaults.

use core::fmt;

use super::{Settings, SettingsRequest};

/// Marks a programmed settings record.
pub const SETTINGS_MAGIC: u32 = 0x1234_ABCD;

/// Bytes occupied by one settings record.
pub const RECORD_LEN: usize = 256;

const HEADER_LEN: usize = 6;

/// Non-volatile backing for the settings record.
pub trait SettingsStore {
    type Error: fmt::Debug;

    /// Reads the stored record into `record`.
    ///
    /// # Errors
    ///
    /// Returns the backend error when the medium cannot be read.
    fn read(&mut self, record: &mut [u8; RECORD_LEN]) -> Result<(), Self::Error>;

    /// Replaces the stored record.
    ///
    /// # Errors
    ///
    /// Returns the backend error when the medium cannot be erased or written.
    fn write(&mut self, record: &[u8; RECORD_LEN]) -> Result<(), Self::Error>;
}

/// Failures while persisting settings. The in-memory copy is applied regardless.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PersistError {
    /// The backend rejected a read or write.
    Storage,
    /// The settings did not fit the record.
    Encode,
    /// The stored record is not a valid settings payload.
    Decode,
    /// Read-back after writing did not match.
    Verify,
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Storage => "settings storage failure",
            Self::Encode => "settings do not fit the record",
            Self::Decode => "settings record is corrupt",
            Self::Verify => "settings read-back mismatch",
        };
        f.write_str(text)
    }
}

/// Serializes `settings` into a padded record.
///
/// # Errors
///
/// Returns [`PersistError::Encode`] when the payload exceeds the record.
pub fn encode_record(settings: &Settings) -> Result<[u8; RECORD_LEN], PersistError> {
    let mut record = [0xFF; RECORD_LEN];
    let written = postcard::to_slice(settings, &mut record[HEADER_LEN..])
        .map_err(|_| PersistError::Encode)?
        .len();
    let length = u16::try_from(written).map_err(|_| PersistError::Encode)?;
    record[..4].copy_from_slice(&SETTINGS_MAGIC.to_le_bytes());
    record[4..HEADER_LEN].copy_from_slice(&length.to_le_bytes());
    Ok(record)
}

/// Parses a record, returning `Ok(None)` when no record was ever written.
///
/// # Errors
///
/// Returns [`PersistError::Decode`] when the magic is present but the payload
/// is unreadable.
pub fn decode_record(record: &[u8; RECORD_LEN]) -> Result<Option<Settings>, PersistError> {
    let magic = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
    if magic != SETTINGS_MAGIC {
        return Ok(None);
    }
    let length = usize::from(u16::from_le_bytes([record[4], record[5]]));
    let payload = record
        .get(HEADER_LEN..HEADER_LEN + length)
        .ok_or(PersistError::Decode)?;
    postcard::from_bytes(payload)
        .map(Some)
        .map_err(|_| PersistError::Decode)
}

/// Owns the authoritative settings and their backing store.
pub struct SettingsService<S> {
    store: S,
    current: Settings,
}

impl<S> SettingsService<S>
where
    S: SettingsStore,
{
    /// Loads the stored record, falling back to defaults when absent or invalid.
    pub fn load(mut store: S) -> Self {
        let mut record = [0u8; RECORD_LEN];
        let current = match store.read(&mut record) {
            Ok(()) => match decode_record(&record) {
                Ok(Some(settings)) => settings,
                Ok(None) => {
                    info!("settings: no record, using defaults");
                    Settings::new()
                }
                Err(error) => {
                    warn!("settings: {}, using defaults", error);
                    Settings::new()
                }
            },
            Err(_) => {
                warn!("settings: read failed, using defaults");
                Settings::new()
            }
        };
        Self { store, current }
    }

    #[must_use]
    pub fn current(&self) -> &Settings {
        &self.current
    }

    /// Applies `request` in memory, then persists and verifies it.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistError`] when the record could not be written or
    /// verified; the in-memory settings keep the change either way.
    pub fn apply(&mut self, request: &SettingsRequest) -> Result<(), PersistError> {
        request.apply_to(&mut self.current);
        self.persist()
    }

    fn persist(&mut self) -> Result<(), PersistError> {
        let record = encode_record(&self.current)?;
        self.store.write(&record).map_err(|_| PersistError::Storage)?;

        let mut readback = [0u8; RECORD_LEN];
        self.store
            .read(&mut readback)
            .map_err(|_| PersistError::Storage)?;
        if readback == record {
            Ok(())
        } else {
            Err(PersistError::Verify)
        }
    }
}
