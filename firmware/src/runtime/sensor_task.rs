//! Samples the pressure transducer and the motor current sensor.

use compressor_core::config::BridgeConfig;
use compressor_core::control::sensors::{adc_volts, current_amps, pressure_psi, round_tenth};
use compressor_core::control::{ControlRequest, SensorTracker};
use compressor_core::protocol::Info;
use embassy_rp::adc::{self, Adc};
use embassy_time::{Duration, Ticker, with_timeout};

use crate::channels::{CONTROL_REQUESTS, OUTBOUND};
use crate::instant::to_embassy;

const SAMPLE_PERIOD: Duration = Duration::from_millis(500);

#[embassy_executor::task]
pub async fn run(
    mut adc: Adc<'static, adc::Async>,
    mut pressure: adc::Channel<'static>,
    mut current: adc::Channel<'static>,
) -> ! {
    let mut tracker = SensorTracker::new();
    let mut ticker = Ticker::every(SAMPLE_PERIOD);
    let send_timeout = to_embassy(BridgeConfig::DEFAULT.send_timeout);

    loop {
        ticker.next().await;

        let (raw_pressure, raw_current) = match (adc.read(&mut pressure).await, adc.read(&mut current).await) {
            (Ok(p), Ok(c)) => (p, c),
            (Err(error), _) | (_, Err(error)) => {
                defmt::warn!("sensors: adc read failed: {}", error);
                continue;
            }
        };

        let psi = round_tenth(pressure_psi(adc_volts(raw_pressure)));
        let amps = round_tenth(current_amps(adc_volts(raw_current)));
        let report = tracker.update(psi, amps);

        if let Some(psi) = report.pressure_changed {
            let sent = with_timeout(send_timeout, OUTBOUND.send(Info::PressureChanged(psi))).await;
            if sent.is_err() {
                defmt::debug!("sensors: outbound queue full, dropping pressure {}", psi);
            }
        }
        for trigger in report.triggers {
            defmt::debug!("sensors: {}", trigger);
            let sent = with_timeout(send_timeout, CONTROL_REQUESTS.send(ControlRequest::Sensor(trigger))).await;
            if sent.is_err() {
                defmt::warn!("sensors: control queue full, dropping {}", trigger);
            }
        }
    }
}
