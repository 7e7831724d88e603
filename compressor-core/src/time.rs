//! Monotonic instant abstraction shared by the deadline-driven state machines.

use core::time::Duration;

/// Trait implemented by monotonic instant wrappers used for deadline tracking.
pub trait Monotonic: Copy + Ord {
    /// Returns the instant `duration` after `self`, saturating at the far future.
    #[must_use]
    fn after(self, duration: Duration) -> Self;

    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Converts a duration to whole milliseconds, saturating at `u32::MAX`.
#[must_use]
pub fn duration_ms(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

#[cfg(test)]
pub(crate) mod mock {
    use super::Monotonic;
    use core::time::Duration;

    use embedded_hal_async::delay::DelayNs;

    /// Millisecond instant used by unit tests.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
    pub struct MockInstant(pub u64);

    impl MockInstant {
        pub fn ms(value: u64) -> Self {
            Self(value)
        }
    }

    impl Monotonic for MockInstant {
        fn after(self, duration: Duration) -> Self {
            let delta = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
            Self(self.0.saturating_add(delta))
        }

        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_millis(self.0.saturating_sub(earlier.0))
        }
    }

    /// Delay that returns immediately and records how long it was asked to wait.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct RecordingDelay {
        pub total_ms: u64,
        pub calls: u32,
    }

    impl DelayNs for RecordingDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.total_ms += u64::from(ns / 1_000_000);
            self.calls += 1;
        }

        async fn delay_ms(&mut self, ms: u32) {
            self.total_ms += u64::from(ms);
            self.calls += 1;
        }
    }
}
