#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Embassy instant adapter for the core state machines.

use core::time::Duration as CoreDuration;

use compressor_core::time::Monotonic;
use embassy_time::{Duration, Instant};

/// Embassy [`Instant`] that satisfies [`Monotonic`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    #[cfg(target_os = "none")]
    #[must_use]
    pub fn now() -> Self {
        Self(Instant::now())
    }

    #[must_use]
    pub const fn into_embassy(self) -> Instant {
        self.0
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(instant: Instant) -> Self {
        Self(instant)
    }
}

/// Converts a core duration to embassy ticks, saturating.
#[must_use]
pub fn to_embassy(duration: CoreDuration) -> Duration {
    Duration::from_micros(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX))
}

impl Monotonic for FirmwareInstant {
    fn after(self, duration: CoreDuration) -> Self {
        self.0
            .checked_add(to_embassy(duration))
            .map_or(Self(Instant::MAX), Self)
    }

    fn saturating_duration_since(&self, earlier: Self) -> CoreDuration {
        let elapsed = self.0.saturating_duration_since(earlier.0);
        CoreDuration::from_micros(elapsed.as_micros())
    }
}
