//! JSON wire form for [`Message`].
//!
//! Every message is a single flat object carrying `messageType`, one
//! discriminator (`commandType` or `infoType`), and at most one numeric
//! payload (`timeout` or `pressure`). Unknown fields are ignored on decode.

use core::fmt;

use heapless::Vec;
use serde::{Deserialize, Serialize};

use super::{Command, Info, Message, TimerChannel};

/// Largest encoded message the firmware ever produces.
pub const MAX_FRAME_LEN: usize = 128;

/// Owned buffer holding one encoded message.
pub type EncodedFrame = Vec<u8, MAX_FRAME_LEN>;

/// Failures raised while mapping between [`Message`] and JSON.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// The input ended before a complete object was read.
    Incomplete,
    /// The input is not a structured message object.
    Malformed,
    /// `messageType` names a kind the matching discriminator is missing for.
    MissingDiscriminator,
    /// A timeout change arrived without its `timeout` field.
    MissingPayload,
    /// The output buffer cannot hold the encoded message.
    BufferTooSmall,
    /// Accumulated input exceeded the receive buffer.
    Overflow,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Incomplete => "message truncated",
            Self::Malformed => "malformed message",
            Self::MissingDiscriminator => "message type without discriminator",
            Self::MissingPayload => "missing numeric payload",
            Self::BufferTooSmall => "output buffer too small",
            Self::Overflow => "receive buffer overflow",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum MessageKind {
    Command,
    Info,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum CommandTag {
    On,
    Off,
    OffRelease,
    SetCompressionTimeout,
    #[serde(rename = "SET_RELEASE_TIMEOUT", alias = "SET_SUPPLY_TIMEOUT")]
    SetSupplyTimeout,
    SetMotorTimeout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum InfoTag {
    TurnedOn,
    TurnedOff,
    Releasing,
    Released,
    PressureChange,
    MotorStart,
    MotorStop,
    SupplyStart,
    SupplyStop,
    CompressionCountdownEnd,
    ReleaseCountdownEnd,
    MotorCountdownEnd,
    CompressionCountdownUpdated,
    ReleaseCountdownUpdated,
    MotorCountdownUpdated,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    message_type: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command_type: Option<CommandTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    info_type: Option<InfoTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pressure: Option<f32>,
}

impl WireMessage {
    const fn command(tag: CommandTag, timeout: Option<u32>) -> Self {
        Self {
            message_type: MessageKind::Command,
            command_type: Some(tag),
            info_type: None,
            timeout,
            pressure: None,
        }
    }

    const fn info(tag: InfoTag) -> Self {
        Self {
            message_type: MessageKind::Info,
            command_type: None,
            info_type: Some(tag),
            timeout: None,
            pressure: None,
        }
    }
}

const fn countdown_end_tag(channel: TimerChannel) -> InfoTag {
    match channel {
        TimerChannel::Compression => InfoTag::CompressionCountdownEnd,
        TimerChannel::Supply => InfoTag::ReleaseCountdownEnd,
        TimerChannel::Motor => InfoTag::MotorCountdownEnd,
    }
}

const fn countdown_update_tag(channel: TimerChannel) -> InfoTag {
    match channel {
        TimerChannel::Compression => InfoTag::CompressionCountdownUpdated,
        TimerChannel::Supply => InfoTag::ReleaseCountdownUpdated,
        TimerChannel::Motor => InfoTag::MotorCountdownUpdated,
    }
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        match *message {
            Message::Command(command) => match command {
                Command::On => Self::command(CommandTag::On, None),
                Command::Off => Self::command(CommandTag::Off, None),
                Command::OffRelease => Self::command(CommandTag::OffRelease, None),
                Command::SetCompressionTimeout(minutes) => {
                    Self::command(CommandTag::SetCompressionTimeout, Some(minutes))
                }
                Command::SetSupplyTimeout(minutes) => {
                    Self::command(CommandTag::SetSupplyTimeout, Some(minutes))
                }
                Command::SetMotorTimeout(minutes) => {
                    Self::command(CommandTag::SetMotorTimeout, Some(minutes))
                }
            },
            Message::Info(info) => match info {
                Info::TurnedOn => Self::info(InfoTag::TurnedOn),
                Info::TurnedOff => Self::info(InfoTag::TurnedOff),
                Info::Releasing => Self::info(InfoTag::Releasing),
                Info::Released => Self::info(InfoTag::Released),
                Info::PressureChanged(psi) => Self {
                    pressure: Some(psi),
                    ..Self::info(InfoTag::PressureChange)
                },
                Info::MotorStart => Self::info(InfoTag::MotorStart),
                Info::MotorStop => Self::info(InfoTag::MotorStop),
                Info::SupplyStart => Self::info(InfoTag::SupplyStart),
                Info::SupplyStop => Self::info(InfoTag::SupplyStop),
                Info::CountdownEnd(channel) => Self::info(countdown_end_tag(channel)),
                Info::CountdownUpdate(channel, remaining) => Self {
                    timeout: Some(remaining),
                    ..Self::info(countdown_update_tag(channel))
                },
            },
        }
    }
}

impl TryFrom<WireMessage> for Message {
    type Error = CodecError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        match wire.message_type {
            MessageKind::Command => {
                let tag = wire.command_type.ok_or(CodecError::MissingDiscriminator)?;
                let timeout = || wire.timeout.ok_or(CodecError::MissingPayload);
                let command = match tag {
                    CommandTag::On => Command::On,
                    CommandTag::Off => Command::Off,
                    CommandTag::OffRelease => Command::OffRelease,
                    CommandTag::SetCompressionTimeout => {
                        Command::SetCompressionTimeout(timeout()?)
                    }
                    CommandTag::SetSupplyTimeout => Command::SetSupplyTimeout(timeout()?),
                    CommandTag::SetMotorTimeout => Command::SetMotorTimeout(timeout()?),
                };
                Ok(Self::Command(command))
            }
            MessageKind::Info => {
                let tag = wire.info_type.ok_or(CodecError::MissingDiscriminator)?;
                let timeout = || wire.timeout.ok_or(CodecError::MissingPayload);
                let info = match tag {
                    InfoTag::TurnedOn => Info::TurnedOn,
                    InfoTag::TurnedOff => Info::TurnedOff,
                    InfoTag::Releasing => Info::Releasing,
                    InfoTag::Released => Info::Released,
                    InfoTag::PressureChange => {
                        Info::PressureChanged(wire.pressure.ok_or(CodecError::MissingPayload)?)
                    }
                    InfoTag::MotorStart => Info::MotorStart,
                    InfoTag::MotorStop => Info::MotorStop,
                    InfoTag::SupplyStart => Info::SupplyStart,
                    InfoTag::SupplyStop => Info::SupplyStop,
                    InfoTag::CompressionCountdownEnd => {
                        Info::CountdownEnd(TimerChannel::Compression)
                    }
                    InfoTag::ReleaseCountdownEnd => Info::CountdownEnd(TimerChannel::Supply),
                    InfoTag::MotorCountdownEnd => Info::CountdownEnd(TimerChannel::Motor),
                    InfoTag::CompressionCountdownUpdated => {
                        Info::CountdownUpdate(TimerChannel::Compression, timeout()?)
                    }
                    InfoTag::ReleaseCountdownUpdated => {
                        Info::CountdownUpdate(TimerChannel::Supply, timeout()?)
                    }
                    InfoTag::MotorCountdownUpdated => {
                        Info::CountdownUpdate(TimerChannel::Motor, timeout()?)
                    }
                };
                Ok(Self::Info(info))
            }
        }
    }
}

/// Encodes `message` into `buffer`, returning the number of bytes written.
///
/// # Errors
///
/// Returns [`CodecError::BufferTooSmall`] when `buffer` cannot hold the object.
pub fn encode_into(message: &Message, buffer: &mut [u8]) -> Result<usize, CodecError> {
    serde_json_core::to_slice(&WireMessage::from(message), buffer)
        .map_err(|_| CodecError::BufferTooSmall)
}

/// Encodes `message` into an owned frame.
///
/// # Errors
///
/// Returns [`CodecError::BufferTooSmall`] if the object exceeds [`MAX_FRAME_LEN`].
pub fn encode(message: &Message) -> Result<EncodedFrame, CodecError> {
    let mut scratch = [0u8; MAX_FRAME_LEN];
    let written = encode_into(message, &mut scratch)?;
    Vec::from_slice(&scratch[..written]).map_err(|_| CodecError::BufferTooSmall)
}

/// Decodes exactly one message from `bytes`.
///
/// Surrounding whitespace is accepted; anything else after the object is not.
///
/// # Errors
///
/// Returns [`CodecError::Incomplete`] when the object is cut short and another
/// variant when the bytes can never become a valid message.
pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
    let (wire, _) = serde_json_core::from_slice::<WireMessage>(bytes).map_err(classify)?;
    Message::try_from(wire)
}

fn classify(error: serde_json_core::de::Error) -> CodecError {
    use serde_json_core::de::Error;

    match error {
        Error::EofWhileParsingList
        | Error::EofWhileParsingObject
        | Error::EofWhileParsingString
        | Error::EofWhileParsingNumber
        | Error::EofWhileParsingValue => CodecError::Incomplete,
        _ => CodecError::Malformed,
    }
}
