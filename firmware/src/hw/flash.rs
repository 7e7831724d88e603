//! Settings record in the on-board QSPI flash.

use compressor_core::settings::{RECORD_LEN, SettingsStore};
use embassy_rp::Peri;
use embassy_rp::flash::{Blocking, ERASE_SIZE, Error, Flash};
use embassy_rp::peripherals::FLASH;

/// Total flash on the Pico W.
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Offset of the settings sector from the start of flash.
pub const SETTINGS_OFFSET: u32 = 0x10_0000;

/// One erase sector reserved for the settings record.
pub struct FlashStore {
    flash: Flash<'static, FLASH, Blocking, FLASH_SIZE>,
}

impl FlashStore {
    #[must_use]
    pub fn new(flash: Peri<'static, FLASH>) -> Self {
        Self {
            flash: Flash::new_blocking(flash),
        }
    }

    /// Factory-programmed flash ID, used to seed the network stack.
    pub fn unique_id(&mut self) -> u64 {
        let mut id = [0u8; 8];
        if self.flash.blocking_unique_id(&mut id).is_err() {
            defmt::warn!("flash: unique id unavailable");
        }
        u64::from_le_bytes(id)
    }
}

impl SettingsStore for FlashStore {
    type Error = Error;

    fn read(&mut self, record: &mut [u8; RECORD_LEN]) -> Result<(), Error> {
        self.flash.blocking_read(SETTINGS_OFFSET, record)
    }

    fn write(&mut self, record: &[u8; RECORD_LEN]) -> Result<(), Error> {
        // ERASE_SIZE is 4 KiB, so the cast is lossless.
        #[allow(clippy::cast_possible_truncation)]
        let sector_end = SETTINGS_OFFSET + ERASE_SIZE as u32;
        self.flash.blocking_erase(SETTINGS_OFFSET, sector_end)?;
        self.flash.blocking_write(SETTINGS_OFFSET, record)
    }
}
