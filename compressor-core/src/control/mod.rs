//! Device control state machine.
//!
//! [`ControlMachine`] owns the relay and solenoid outputs plus the three
//! countdown channels. It is sans-IO: callers hand it commands, sensor
//! triggers, and the current instant, then drain the queued [`Info`] reports
//! and sleep until [`ControlMachine::next_deadline`].
//!
//! A release holds the solenoid open for a fixed dwell. The machine splits it
//! into [`ControlMachine::begin_release`] and [`ControlMachine::finish_release`]
//! and reports the dwell through [`ControlStep::Dwell`]; the caller waits it
//! out without servicing anything else, so commands arriving meanwhile queue.

pub mod countdown;
pub mod interaction;
pub mod sensors;

use core::time::Duration;

use heapless::Deque;

use crate::config::ControlConfig;
use crate::protocol::{Command, Info, TimerChannel};
use crate::settings::Timeouts;
use crate::time::Monotonic;

pub use countdown::{Countdown, CountdownEvent};
pub use interaction::{Button, ButtonEdge, ButtonPipeline, Edge, InteractionEvent};
pub use sensors::{SensorReport, SensorTracker, SensorTrigger};

/// Number of info reports the machine can hold between drains.
pub const INFO_OUTBOX_DEPTH: usize = 16;

/// Digital outputs driven by the machine.
pub trait ControlOutputs {
    /// Energizes (`true`) or releases the compressor relay.
    fn set_relay(&mut self, energized: bool);
    /// Opens (`true`) or closes the pressure-release solenoid.
    fn set_solenoid(&mut self, open: bool);
}

/// Receives timeout changes that must be persisted.
pub trait TimeoutStore {
    fn persist_timeout(&mut self, channel: TimerChannel, minutes: u32);
}

/// Work the caller must perform after handing the machine an input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlStep {
    /// Nothing further; sleep until the next deadline or input.
    Idle,
    /// A release is in progress: wait this long, then call
    /// [`ControlMachine::finish_release`].
    Dwell(Duration),
}

/// Inputs from local producers (sensor sampling and the interaction dispatcher).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlRequest {
    Sensor(SensorTrigger),
    /// Short press on the shutdown button.
    Shutdown,
}

/// Owns the outputs and countdown channels.
pub struct ControlMachine<O, S, I> {
    outputs: O,
    store: S,
    config: ControlConfig,
    countdowns: [Countdown<I>; 3],
    releasing: bool,
    relay: bool,
    solenoid: bool,
    outbox: Deque<Info, INFO_OUTBOX_DEPTH>,
}

impl<O, S, I> ControlMachine<O, S, I>
where
    O: ControlOutputs,
    S: TimeoutStore,
    I: Monotonic,
{
    /// Creates the machine with both outputs in their safe (off, closed) state.
    pub fn new(mut outputs: O, store: S, timeouts: Timeouts, config: ControlConfig) -> Self {
        outputs.set_relay(false);
        outputs.set_solenoid(false);
        let period = config.watch_period;
        Self {
            outputs,
            store,
            config,
            countdowns: TimerChannel::ALL.map(|channel| {
                Countdown::new(channel, timeouts.minutes(channel), period)
            }),
            releasing: false,
            relay: false,
            solenoid: false,
            outbox: Deque::new(),
        }
    }

    #[must_use]
    pub fn outputs(&self) -> &O {
        &self.outputs
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn relay_energized(&self) -> bool {
        self.relay
    }

    #[must_use]
    pub fn solenoid_open(&self) -> bool {
        self.solenoid
    }

    #[must_use]
    pub fn is_releasing(&self) -> bool {
        self.releasing
    }

    #[must_use]
    pub fn countdown(&self, channel: TimerChannel) -> &Countdown<I> {
        &self.countdowns[channel.index()]
    }

    /// Pops the oldest queued info report.
    pub fn next_info(&mut self) -> Option<Info> {
        self.outbox.pop_front()
    }

    /// Dispatches a remote command.
    pub fn handle_command(&mut self, command: Command, now: I) -> ControlStep {
        if self.releasing {
            warn!("control: command during release dwell ignored");
            return ControlStep::Idle;
        }

        match command {
            Command::On => {
                self.turn_on(now);
                ControlStep::Idle
            }
            Command::Off => {
                self.turn_off();
                ControlStep::Idle
            }
            Command::OffRelease => self.begin_release(),
            Command::SetCompressionTimeout(minutes) => {
                self.set_timeout(TimerChannel::Compression, minutes, now);
                ControlStep::Idle
            }
            Command::SetSupplyTimeout(minutes) => {
                self.set_timeout(TimerChannel::Supply, minutes, now);
                ControlStep::Idle
            }
            Command::SetMotorTimeout(minutes) => {
                self.set_timeout(TimerChannel::Motor, minutes, now);
                ControlStep::Idle
            }
        }
    }

    /// Dispatches a local request.
    pub fn handle_request(&mut self, request: ControlRequest, now: I) -> ControlStep {
        if self.releasing {
            warn!("control: request during release dwell ignored");
            return ControlStep::Idle;
        }

        match request {
            ControlRequest::Sensor(trigger) => {
                self.handle_sensor(trigger, now);
                ControlStep::Idle
            }
            ControlRequest::Shutdown => self.begin_release(),
        }
    }

    pub fn turn_on(&mut self, now: I) {
        info!("control: on");
        self.drive_relay(true);
        self.drive_solenoid(false);
        self.emit(Info::TurnedOn);
        self.start_countdown(TimerChannel::Compression, now);
    }

    pub fn turn_off(&mut self) {
        info!("control: off");
        self.drive_relay(false);
        self.drive_solenoid(false);
        self.emit(Info::TurnedOff);
        self.stop_countdown(TimerChannel::Compression);
    }

    /// De-energizes the relay and opens the solenoid.
    pub fn begin_release(&mut self) -> ControlStep {
        info!("control: release started");
        self.drive_relay(false);
        self.emit(Info::TurnedOff);
        self.drive_solenoid(true);
        self.emit(Info::Releasing);
        self.releasing = true;
        ControlStep::Dwell(self.config.release_dwell)
    }

    /// Closes the solenoid once the dwell has elapsed.
    pub fn finish_release(&mut self) {
        if !self.releasing {
            return;
        }
        self.releasing = false;
        self.drive_solenoid(false);
        self.emit(Info::Released);
        self.stop_countdown(TimerChannel::Compression);
        info!("control: release finished");
    }

    /// Applies a timeout change and requests it be persisted.
    pub fn set_timeout(&mut self, channel: TimerChannel, minutes: u32, now: I) {
        let countdown = &mut self.countdowns[channel.index()];
        countdown.set_timeout(minutes, now);
        let applied = countdown.timeout_minutes();
        info!("control: {} timeout set to {} min", channel.label(), applied);
        self.store.persist_timeout(channel, applied);
        self.emit(Info::CountdownUpdate(channel, applied));
    }

    pub fn handle_sensor(&mut self, trigger: SensorTrigger, now: I) {
        match trigger {
            SensorTrigger::MotorStart => {
                self.emit(Info::MotorStart);
                self.start_countdown(TimerChannel::Motor, now);
            }
            SensorTrigger::MotorStop => {
                self.emit(Info::MotorStop);
                self.stop_countdown(TimerChannel::Motor);
            }
            SensorTrigger::SupplyStart => {
                self.emit(Info::SupplyStart);
                self.start_countdown(TimerChannel::Supply, now);
            }
            SensorTrigger::SupplyStop => {
                self.emit(Info::SupplyStop);
                self.stop_countdown(TimerChannel::Supply);
            }
        }
    }

    /// Earliest instant at which [`Self::poll`] has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<I> {
        if self.releasing {
            return None;
        }
        self.countdowns
            .iter()
            .filter_map(Countdown::next_deadline)
            .min()
    }

    /// Services due watch ticks and countdown expiries.
    ///
    /// Any expiry triggers a full release; the returned dwell must complete
    /// before polling again.
    pub fn poll(&mut self, now: I) -> ControlStep {
        if self.releasing {
            return ControlStep::Idle;
        }

        for channel in TimerChannel::ALL {
            while let Some(event) = self.countdowns[channel.index()].poll(now) {
                match event {
                    CountdownEvent::Progress(remaining) => {
                        self.emit(Info::CountdownUpdate(channel, remaining));
                    }
                    CountdownEvent::Expired => {
                        warn!("control: {} countdown expired", channel.label());
                        self.emit(Info::CountdownEnd(channel));
                        return self.begin_release();
                    }
                }
            }
        }

        ControlStep::Idle
    }

    fn start_countdown(&mut self, channel: TimerChannel, now: I) {
        let countdown = &mut self.countdowns[channel.index()];
        countdown.start(now);
        let timeout = countdown.timeout_minutes();
        self.emit(Info::CountdownUpdate(channel, timeout));
    }

    fn stop_countdown(&mut self, channel: TimerChannel) {
        self.countdowns[channel.index()].stop();
        self.emit(Info::CountdownUpdate(channel, 0));
    }

    fn drive_relay(&mut self, energized: bool) {
        self.relay = energized;
        self.outputs.set_relay(energized);
    }

    fn drive_solenoid(&mut self, open: bool) {
        self.solenoid = open;
        self.outputs.set_solenoid(open);
    }

    fn emit(&mut self, info: Info) {
        if self.outbox.push_back(info).is_err() {
            warn!("control: info outbox full, dropping {}", info);
        }
    }
}
