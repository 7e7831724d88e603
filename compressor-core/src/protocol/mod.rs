//! Message vocabulary exchanged with the remote operator endpoint.
//!
//! Commands flow from the remote peer to the control state machine; info
//! messages flow back. [`codec`] maps both onto the JSON wire form and
//! [`frame`] finds message boundaries in a received byte stream.

pub mod codec;
pub mod frame;

pub use codec::{CodecError, EncodedFrame, MAX_FRAME_LEN, decode, encode, encode_into};
pub use frame::{FrameAccumulator, FrameOutcome};

/// Identifies one of the three countdown/watch timer pairs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerChannel {
    /// Bounds how long the compressor may run after `On`.
    Compression,
    /// Bounds how long supply pressure may keep falling.
    Supply,
    /// Bounds how long the motor may draw current.
    Motor,
}

impl TimerChannel {
    /// Every channel in index order.
    pub const ALL: [Self; 3] = [Self::Compression, Self::Supply, Self::Motor];

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Compression => 0,
            Self::Supply => 1,
            Self::Motor => 2,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Compression => "compression",
            Self::Supply => "supply",
            Self::Motor => "motor",
        }
    }
}

/// Requests issued by the remote peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    On,
    Off,
    OffRelease,
    /// New compression timeout in minutes.
    SetCompressionTimeout(u32),
    /// New supply timeout in minutes.
    SetSupplyTimeout(u32),
    /// New motor timeout in minutes.
    SetMotorTimeout(u32),
}

impl Command {
    /// Returns the channel and minutes carried by a timeout change.
    #[must_use]
    pub const fn timeout_change(self) -> Option<(TimerChannel, u32)> {
        match self {
            Self::SetCompressionTimeout(minutes) => Some((TimerChannel::Compression, minutes)),
            Self::SetSupplyTimeout(minutes) => Some((TimerChannel::Supply, minutes)),
            Self::SetMotorTimeout(minutes) => Some((TimerChannel::Motor, minutes)),
            Self::On | Self::Off | Self::OffRelease => None,
        }
    }

    /// Builds the timeout-change command for `channel`.
    #[must_use]
    pub const fn set_timeout(channel: TimerChannel, minutes: u32) -> Self {
        match channel {
            TimerChannel::Compression => Self::SetCompressionTimeout(minutes),
            TimerChannel::Supply => Self::SetSupplyTimeout(minutes),
            TimerChannel::Motor => Self::SetMotorTimeout(minutes),
        }
    }
}

/// State reports published by the device.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Info {
    TurnedOn,
    TurnedOff,
    Releasing,
    Released,
    /// Rounded supply pressure in PSI.
    PressureChanged(f32),
    MotorStart,
    MotorStop,
    SupplyStart,
    SupplyStop,
    CountdownEnd(TimerChannel),
    /// Minutes remaining on a running countdown.
    CountdownUpdate(TimerChannel, u32),
}

/// One unit on the wire: either a command or an info report.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Message {
    Command(Command),
    Info(Info),
}

impl From<Command> for Message {
    fn from(command: Command) -> Self {
        Self::Command(command)
    }
}

impl From<Info> for Message {
    fn from(info: Info) -> Self {
        Self::Info(info)
    }
}
