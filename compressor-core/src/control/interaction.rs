//! Debounced button pipeline.
//!
//! Pin watchers push raw [`ButtonEdge`]s through a non-blocking channel; a
//! single [`ButtonPipeline`] owns all press timing and turns edges into
//! [`InteractionEvent`]s.

use core::time::Duration;

use crate::time::Monotonic;

/// Physical inputs feeding the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Button {
    Shutdown,
    ForgetWifi,
}

/// Electrical transition on an active-low button.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    /// Button pressed.
    Falling,
    /// Button released.
    Rising,
}

/// Raw edge captured by a pin watcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ButtonEdge<I> {
    pub button: Button,
    pub edge: Edge,
    pub at: I,
}

/// User intent derived from button presses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InteractionEvent {
    Shutdown,
    ForgetWifi,
}

/// Owns the shutdown long-press timer.
pub struct ButtonPipeline<I> {
    long_press: Duration,
    armed_until: Option<I>,
}

impl<I> ButtonPipeline<I>
where
    I: Monotonic,
{
    #[must_use]
    pub const fn new(long_press: Duration) -> Self {
        Self {
            long_press,
            armed_until: None,
        }
    }

    /// Feeds one raw edge, returning the interaction it completes.
    pub fn on_edge(&mut self, edge: ButtonEdge<I>) -> Option<InteractionEvent> {
        match (edge.button, edge.edge) {
            (Button::Shutdown, Edge::Falling) => {
                self.armed_until = Some(edge.at.after(self.long_press));
                None
            }
            (Button::Shutdown, Edge::Rising) => match self.armed_until.take() {
                Some(deadline) if edge.at < deadline => Some(InteractionEvent::Shutdown),
                Some(_) => {
                    long_press_elapsed();
                    None
                }
                None => None,
            },
            (Button::ForgetWifi, Edge::Falling) => Some(InteractionEvent::ForgetWifi),
            (Button::ForgetWifi, Edge::Rising) => None,
        }
    }

    /// Deadline of the armed long-press timer.
    #[must_use]
    pub fn next_deadline(&self) -> Option<I> {
        self.armed_until
    }

    /// Fires the long-press timer if due. Returns `true` when it fired.
    pub fn poll(&mut self, now: I) -> bool {
        match self.armed_until {
            Some(deadline) if deadline <= now => {
                self.armed_until = None;
                long_press_elapsed();
                true
            }
            _ => false,
        }
    }
}

fn long_press_elapsed() {
    // Long-press behaviour is not defined for this product yet.
    debug!("buttons: long press on shutdown ignored");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::mock::MockInstant;

    fn edge(button: Button, edge: Edge, at: u64) -> ButtonEdge<MockInstant> {
        ButtonEdge {
            button,
            edge,
            at: MockInstant::ms(at),
        }
    }

    #[test]
    fn release_before_threshold_is_short_press() {
        let mut pipeline = ButtonPipeline::new(Duration::from_millis(500));
        assert_eq!(pipeline.on_edge(edge(Button::Shutdown, Edge::Falling, 1_000)), None);
        assert!(!pipeline.poll(MockInstant::ms(1_200)));
        assert_eq!(
            pipeline.on_edge(edge(Button::Shutdown, Edge::Rising, 1_300)),
            Some(InteractionEvent::Shutdown)
        );
        assert_eq!(pipeline.next_deadline(), None);
    }

    #[test]
    fn timer_firing_first_suppresses_shutdown() {
        let mut pipeline = ButtonPipeline::new(Duration::from_millis(500));
        pipeline.on_edge(edge(Button::Shutdown, Edge::Falling, 0));
        assert!(pipeline.poll(MockInstant::ms(500)));
        assert_eq!(pipeline.on_edge(edge(Button::Shutdown, Edge::Rising, 700)), None);
    }

    #[test]
    fn late_release_without_poll_is_still_long() {
        let mut pipeline = ButtonPipeline::new(Duration::from_millis(500));
        pipeline.on_edge(edge(Button::Shutdown, Edge::Falling, 0));
        assert_eq!(pipeline.on_edge(edge(Button::Shutdown, Edge::Rising, 700)), None);
    }

    #[test]
    fn stray_release_is_ignored() {
        let mut pipeline = ButtonPipeline::<MockInstant>::new(Duration::from_millis(500));
        assert_eq!(pipeline.on_edge(edge(Button::Shutdown, Edge::Rising, 10)), None);
    }

    #[test]
    fn forget_wifi_fires_on_press() {
        let mut pipeline = ButtonPipeline::new(Duration::from_millis(500));
        assert_eq!(
            pipeline.on_edge(edge(Button::ForgetWifi, Edge::Falling, 5)),
            Some(InteractionEvent::ForgetWifi)
        );
        assert_eq!(pipeline.on_edge(edge(Button::ForgetWifi, Edge::Rising, 50)), None);
    }
}
