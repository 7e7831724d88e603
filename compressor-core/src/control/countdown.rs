//! Countdown/watch timer pair for one [`TimerChannel`].
//!
//! The countdown expires `timeout` watch periods after start; the watch fires
//! once per period before that and advances the elapsed accumulator. Both are
//! tracked as deadlines so the owner only needs to call [`Countdown::poll`]
//! whenever [`Countdown::next_deadline`] has passed.

use core::time::Duration;

use crate::protocol::TimerChannel;
use crate::time::Monotonic;

/// Event produced by a due countdown deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CountdownEvent {
    /// A watch period passed; carries the minutes remaining.
    Progress(u32),
    /// The countdown reached zero and stopped.
    Expired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Armed<I> {
    next_watch: I,
    expires_at: I,
}

/// One countdown channel with its progress watch.
#[derive(Clone, Debug)]
pub struct Countdown<I> {
    channel: TimerChannel,
    timeout_minutes: u32,
    elapsed_minutes: u32,
    period: Duration,
    armed: Option<Armed<I>>,
}

impl<I> Countdown<I>
where
    I: Monotonic,
{
    /// Creates a stopped countdown. Timeouts below one minute are raised to one.
    #[must_use]
    pub fn new(channel: TimerChannel, timeout_minutes: u32, period: Duration) -> Self {
        Self {
            channel,
            timeout_minutes: timeout_minutes.max(1),
            elapsed_minutes: 0,
            period,
            armed: None,
        }
    }

    #[must_use]
    pub fn channel(&self) -> TimerChannel {
        self.channel
    }

    #[must_use]
    pub fn timeout_minutes(&self) -> u32 {
        self.timeout_minutes
    }

    #[must_use]
    pub fn elapsed_minutes(&self) -> u32 {
        self.elapsed_minutes
    }

    #[must_use]
    pub fn remaining_minutes(&self) -> u32 {
        self.timeout_minutes - self.elapsed_minutes
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.armed.is_some()
    }

    /// Starts (or restarts) the countdown from `now`.
    pub fn start(&mut self, now: I) {
        self.elapsed_minutes = 0;
        self.armed = Some(Armed {
            next_watch: now.after(self.period),
            expires_at: now.after(self.period * self.timeout_minutes),
        });
    }

    pub fn stop(&mut self) {
        self.elapsed_minutes = 0;
        self.armed = None;
    }

    /// Applies a new timeout, restarting the countdown if it was running.
    pub fn set_timeout(&mut self, minutes: u32, now: I) {
        self.timeout_minutes = minutes.max(1);
        if self.is_running() {
            self.start(now);
        } else {
            self.elapsed_minutes = 0;
        }
    }

    /// Earliest instant at which [`Self::poll`] has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<I> {
        self.armed.map(|armed| armed.next_watch.min(armed.expires_at))
    }

    /// Handles at most one due deadline. Call repeatedly until it returns `None`.
    pub fn poll(&mut self, now: I) -> Option<CountdownEvent> {
        let armed = self.armed.as_mut()?;

        if armed.next_watch < armed.expires_at && armed.next_watch <= now {
            armed.next_watch = armed.next_watch.after(self.period);
            self.elapsed_minutes = (self.elapsed_minutes + 1).min(self.timeout_minutes);
            return Some(CountdownEvent::Progress(
                self.timeout_minutes - self.elapsed_minutes,
            ));
        }

        if armed.expires_at <= now {
            self.stop();
            return Some(CountdownEvent::Expired);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::mock::MockInstant;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn watch_reports_remaining_minutes() {
        let mut countdown = Countdown::new(TimerChannel::Compression, 3, MINUTE);
        countdown.start(MockInstant::ms(0));

        assert_eq!(countdown.poll(MockInstant::ms(59_999)), None);
        assert_eq!(
            countdown.poll(MockInstant::ms(60_000)),
            Some(CountdownEvent::Progress(2))
        );
        assert_eq!(countdown.elapsed_minutes(), 1);
        assert_eq!(
            countdown.poll(MockInstant::ms(120_000)),
            Some(CountdownEvent::Progress(1))
        );
        assert_eq!(
            countdown.poll(MockInstant::ms(180_000)),
            Some(CountdownEvent::Expired)
        );
        assert_eq!(countdown.elapsed_minutes(), 0);
        assert!(!countdown.is_running());
        assert_eq!(countdown.poll(MockInstant::ms(240_000)), None);
    }

    #[test]
    fn late_poll_catches_up_in_order() {
        let mut countdown = Countdown::new(TimerChannel::Motor, 2, MINUTE);
        countdown.start(MockInstant::ms(0));

        let now = MockInstant::ms(500_000);
        assert_eq!(countdown.poll(now), Some(CountdownEvent::Progress(1)));
        assert_eq!(countdown.poll(now), Some(CountdownEvent::Expired));
        assert_eq!(countdown.poll(now), None);
    }

    #[test]
    fn timeout_change_restarts_running_countdown() {
        let mut countdown = Countdown::new(TimerChannel::Supply, 5, MINUTE);
        countdown.start(MockInstant::ms(0));
        countdown.poll(MockInstant::ms(60_000));
        assert_eq!(countdown.elapsed_minutes(), 1);

        countdown.set_timeout(10, MockInstant::ms(90_000));
        assert_eq!(countdown.elapsed_minutes(), 0);
        assert_eq!(countdown.next_deadline(), Some(MockInstant::ms(150_000)));
        assert_eq!(countdown.remaining_minutes(), 10);
    }

    #[test]
    fn zero_timeout_is_raised_to_one_minute() {
        let mut countdown = Countdown::<MockInstant>::new(TimerChannel::Motor, 0, MINUTE);
        assert_eq!(countdown.timeout_minutes(), 1);
        countdown.set_timeout(0, MockInstant::ms(0));
        assert_eq!(countdown.timeout_minutes(), 1);
    }
}
