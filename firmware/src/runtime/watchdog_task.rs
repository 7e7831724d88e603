use embassy_rp::watchdog::Watchdog;
use embassy_time::{Duration, Ticker};

const TIMEOUT: Duration = Duration::from_secs(5);
const FEED_PERIOD: Duration = Duration::from_secs(1);

#[embassy_executor::task]
pub async fn run(mut watchdog: Watchdog) -> ! {
    watchdog.start(TIMEOUT);
    let mut ticker = Ticker::every(FEED_PERIOD);
    loop {
        ticker.next().await;
        watchdog.feed();
    }
}
