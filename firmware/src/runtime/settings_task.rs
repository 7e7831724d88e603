//! Sole writer of the settings sector.

use compressor_core::settings::{SettingsRequest, SettingsService};

use crate::channels::SETTINGS_REQUESTS;
use crate::hw::FlashStore;
use crate::status::SETTINGS;

fn describe(request: &SettingsRequest) -> &'static str {
    match request {
        SettingsRequest::SetCredentials(_) => "credentials",
        SettingsRequest::SetTimeout(channel, _) => channel.label(),
        SettingsRequest::Reset => "reset",
    }
}

#[embassy_executor::task]
pub async fn run(mut service: SettingsService<FlashStore>) -> ! {
    loop {
        let request = SETTINGS_REQUESTS.receive().await;
        match service.apply(&request) {
            Ok(()) => defmt::info!("settings: saved {}", describe(&request)),
            Err(error) => defmt::warn!("settings: {} not persisted: {}", describe(&request), error),
        }
        SETTINGS.publish(service.current());
    }
}
