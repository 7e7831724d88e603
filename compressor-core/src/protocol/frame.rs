//! Message boundary detection for the remote stream.
//!
//! The peer sends bare JSON objects with no length prefix. A boundary is the
//! brace that closes the first top-level object; anything after it stays
//! buffered for the next message.

use heapless::Vec;

use super::codec::{CodecError, decode};
use super::Message;

/// Result of feeding received bytes into a [`FrameAccumulator`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FrameOutcome {
    /// The first buffered object formed one message and was consumed.
    Message(Message),
    /// More bytes are needed before the next object is complete.
    Pending,
    /// The first buffered object, or bytes before it, were discarded.
    Dropped(CodecError),
}

/// Buffers partial objects across receive calls.
pub struct FrameAccumulator<const N: usize> {
    buffer: Vec<u8, N>,
}

impl<const N: usize> FrameAccumulator<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Number of bytes waiting for the rest of their object.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Discards any partial object.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Appends `bytes` and extracts the first buffered object.
    ///
    /// A single read may carry several objects; call [`Self::next_frame`]
    /// until it reports [`FrameOutcome::Pending`] to drain the rest.
    pub fn push(&mut self, bytes: &[u8]) -> FrameOutcome {
        if self.buffer.extend_from_slice(bytes).is_err() {
            self.buffer.clear();
            return FrameOutcome::Dropped(CodecError::Overflow);
        }
        self.next_frame()
    }

    /// Extracts the next complete object already in the buffer.
    pub fn next_frame(&mut self) -> FrameOutcome {
        self.skip_whitespace();
        let Some(&first) = self.buffer.first() else {
            return FrameOutcome::Pending;
        };

        if first != b'{' {
            // Resynchronise on the next object start.
            let skip = self
                .buffer
                .iter()
                .position(|&byte| byte == b'{')
                .unwrap_or(self.buffer.len());
            self.consume(skip);
            return FrameOutcome::Dropped(CodecError::Malformed);
        }

        let Some(end) = object_end(&self.buffer) else {
            return FrameOutcome::Pending;
        };
        let outcome = match decode(&self.buffer[..end]) {
            Ok(message) => FrameOutcome::Message(message),
            Err(error) => FrameOutcome::Dropped(error),
        };
        self.consume(end);
        self.skip_whitespace();
        outcome
    }

    fn skip_whitespace(&mut self) {
        let leading = self
            .buffer
            .iter()
            .take_while(|byte| byte.is_ascii_whitespace())
            .count();
        self.consume(leading);
    }

    fn consume(&mut self, count: usize) {
        let count = count.min(self.buffer.len());
        let remaining = self.buffer.len() - count;
        self.buffer.copy_within(count.., 0);
        self.buffer.truncate(remaining);
    }
}

/// Index one past the brace closing the object that starts at `bytes[0]`.
fn object_end(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, &byte) in bytes.iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(index + 1);
                }
            }
            _ => {}
        }
    }
    None
}

impl<const N: usize> Default for FrameAccumulator<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;

    #[test]
    fn completes_object_split_across_reads() {
        let mut frames = FrameAccumulator::<256>::new();
        assert_eq!(frames.push(br#"{"messageType":"COM"#), FrameOutcome::Pending);
        assert_eq!(frames.push(br#"MAND","commandType":"#), FrameOutcome::Pending);
        assert_eq!(
            frames.push(br#""OFF"}"#),
            FrameOutcome::Message(Message::Command(Command::Off))
        );
        assert_eq!(frames.buffered(), 0);
    }

    #[test]
    fn discards_garbage_and_recovers() {
        let mut frames = FrameAccumulator::<256>::new();
        assert!(matches!(frames.push(b"not json"), FrameOutcome::Dropped(_)));
        assert_eq!(frames.buffered(), 0);
        assert_eq!(
            frames.push(br#"{"messageType":"COMMAND","commandType":"ON"}"#),
            FrameOutcome::Message(Message::Command(Command::On))
        );
    }

    #[test]
    fn overflow_drops_buffer() {
        let mut frames = FrameAccumulator::<16>::new();
        assert_eq!(frames.push(br#"{"messageType":"#), FrameOutcome::Pending);
        assert_eq!(
            frames.push(br#""COMMAND""#),
            FrameOutcome::Dropped(CodecError::Overflow)
        );
        assert_eq!(frames.buffered(), 0);
    }

    #[test]
    fn whitespace_keepalive_is_ignored() {
        let mut frames = FrameAccumulator::<64>::new();
        assert_eq!(frames.push(b"\r\n"), FrameOutcome::Pending);
        assert_eq!(frames.buffered(), 0);
    }

    #[test]
    fn coalesced_objects_yield_each_message() {
        let mut frames = FrameAccumulator::<256>::new();
        assert_eq!(
            frames.push(
                br#"{"messageType":"COMMAND","commandType":"ON"}{"messageType":"COMMAND","commandType":"OFF"}"#
            ),
            FrameOutcome::Message(Message::Command(Command::On))
        );
        assert_eq!(
            frames.next_frame(),
            FrameOutcome::Message(Message::Command(Command::Off))
        );
        assert_eq!(frames.next_frame(), FrameOutcome::Pending);
        assert_eq!(frames.buffered(), 0);
    }

    #[test]
    fn partial_object_after_complete_one_is_kept() {
        let mut frames = FrameAccumulator::<256>::new();
        assert_eq!(
            frames.push(br#"{"messageType":"COMMAND","commandType":"ON"}
{"messageType":"COMMAND","#),
            FrameOutcome::Message(Message::Command(Command::On))
        );
        assert_eq!(frames.next_frame(), FrameOutcome::Pending);
        assert_eq!(frames.buffered(), r#"{"messageType":"COMMAND","#.len());
        assert_eq!(
            frames.push(br#""commandType":"OFF_RELEASE"}"#),
            FrameOutcome::Message(Message::Command(Command::OffRelease))
        );
        assert_eq!(frames.buffered(), 0);
    }

    #[test]
    fn braces_inside_strings_do_not_end_the_object() {
        let mut frames = FrameAccumulator::<256>::new();
        assert_eq!(
            frames.push(br#"{"note":"}{","messageType":"COMMAND","commandType":"OFF"}"#),
            FrameOutcome::Message(Message::Command(Command::Off))
        );
    }

    #[test]
    fn bad_object_is_dropped_without_losing_the_next() {
        let mut frames = FrameAccumulator::<256>::new();
        assert_eq!(
            frames.push(br#"{"messageType":"BOGUS"}{"messageType":"COMMAND","commandType":"ON"}"#),
            FrameOutcome::Dropped(CodecError::Malformed)
        );
        assert_eq!(
            frames.next_frame(),
            FrameOutcome::Message(Message::Command(Command::On))
        );
    }
}
