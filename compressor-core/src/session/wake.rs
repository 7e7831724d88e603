//! Multi-reason wake signal for the session manager.
//!
//! Producers raise reasons from any context; the manager atomically takes the
//! whole pending set on each wake and handles it in [`WakeReason::PRIORITY`]
//! order.

use core::future::poll_fn;
use core::task::Poll;

use embassy_sync::waitqueue::AtomicWaker;
use portable_atomic::{AtomicU8, Ordering};

/// Why the session manager should run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeReason {
    Startup,
    ConnectionFailed,
    CredentialsConfigured,
    ClientConnected,
    SocketDisconnected,
    /// The user asked to forget the current network.
    ForgetNetwork,
}

impl WakeReason {
    /// Dispatch order within a single wake.
    pub const PRIORITY: [Self; 6] = [
        Self::Startup,
        Self::ConnectionFailed,
        Self::CredentialsConfigured,
        Self::ClientConnected,
        Self::SocketDisconnected,
        Self::ForgetNetwork,
    ];

    const fn bit(self) -> u8 {
        match self {
            Self::Startup => 1 << 0,
            Self::ConnectionFailed => 1 << 1,
            Self::CredentialsConfigured => 1 << 2,
            Self::ClientConnected => 1 << 3,
            Self::SocketDisconnected => 1 << 4,
            Self::ForgetNetwork => 1 << 5,
        }
    }
}

/// Set of pending wake reasons.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WakeReasons(u8);

impl WakeReasons {
    pub const EMPTY: Self = Self(0);

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn contains(self, reason: WakeReason) -> bool {
        self.0 & reason.bit() != 0
    }

    #[must_use]
    pub const fn with(self, reason: WakeReason) -> Self {
        Self(self.0 | reason.bit())
    }

    /// Iterates the contained reasons in dispatch order.
    pub fn iter(self) -> impl Iterator<Item = WakeReason> {
        WakeReason::PRIORITY
            .into_iter()
            .filter(move |reason| self.contains(*reason))
    }
}

impl FromIterator<WakeReason> for WakeReasons {
    fn from_iter<T: IntoIterator<Item = WakeReason>>(iter: T) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

/// Bitmask condition variable.
pub struct WakeSignal {
    pending: AtomicU8,
    waker: AtomicWaker,
}

impl WakeSignal {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: AtomicU8::new(0),
            waker: AtomicWaker::new(),
        }
    }

    /// Adds `reason` to the pending set and wakes the waiter.
    pub fn raise(&self, reason: WakeReason) {
        self.pending.fetch_or(reason.bit(), Ordering::AcqRel);
        self.waker.wake();
    }

    /// Takes and clears the whole pending set.
    pub fn take(&self) -> WakeReasons {
        WakeReasons(self.pending.swap(0, Ordering::AcqRel))
    }

    /// Pending reasons without clearing them.
    #[must_use]
    pub fn peek(&self) -> WakeReasons {
        WakeReasons(self.pending.load(Ordering::Acquire))
    }

    /// Waits until at least one reason is pending, then takes the set.
    pub async fn wait(&self) -> WakeReasons {
        poll_fn(|cx| {
            let reasons = self.take();
            if !reasons.is_empty() {
                return Poll::Ready(reasons);
            }
            self.waker.register(cx.waker());
            let reasons = self.take();
            if reasons.is_empty() {
                Poll::Pending
            } else {
                Poll::Ready(reasons)
            }
        })
        .await
    }
}

impl Default for WakeSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_clears_and_orders_by_priority() {
        let signal = WakeSignal::new();
        signal.raise(WakeReason::SocketDisconnected);
        signal.raise(WakeReason::Startup);
        signal.raise(WakeReason::ClientConnected);
        signal.raise(WakeReason::Startup);

        let reasons = signal.take();
        let mut order = reasons.iter();
        assert_eq!(order.next(), Some(WakeReason::Startup));
        assert_eq!(order.next(), Some(WakeReason::ClientConnected));
        assert_eq!(order.next(), Some(WakeReason::SocketDisconnected));
        assert_eq!(order.next(), None);
        assert!(signal.take().is_empty());
    }

    #[test]
    fn wait_returns_already_pending_reasons() {
        let signal = WakeSignal::new();
        signal.raise(WakeReason::ConnectionFailed);
        let reasons = embassy_futures::block_on(signal.wait());
        assert!(reasons.contains(WakeReason::ConnectionFailed));
        assert!(signal.peek().is_empty());
    }
}
