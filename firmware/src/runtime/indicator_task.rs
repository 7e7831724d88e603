//! Drives the status pixel from the link flags.

use compressor_core::status::indicator_color;
use embassy_rp::peripherals::PIO1;
use embassy_rp::pio_programs::ws2812::PioWs2812;
use embassy_time::{Duration, Ticker};
use smart_leds::RGB8;

use crate::status::LINK;

const BLINK_PERIOD: Duration = Duration::from_secs(1);

#[embassy_executor::task]
pub async fn run(mut pixel: PioWs2812<'static, PIO1, 0, 1>) -> ! {
    let mut ticker = Ticker::every(BLINK_PERIOD);
    let mut phase = false;
    loop {
        let (r, g, b) = indicator_color(&LINK.snapshot(), phase).rgb();
        pixel.write(&[RGB8::new(r, g, b)]).await;
        phase = !phase;
        ticker.next().await;
    }
}
