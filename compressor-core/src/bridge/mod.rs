//! Socket bridge between the remote peer and the control channels.
//!
//! One bridge instance owns one stream connection. Each tick it sends at most
//! one queued info report, waits a bounded time for inbound bytes, and hands
//! any complete command to the control path. Any transport error ends the
//! instance after raising [`WakeReason::SocketDisconnected`]; the session
//! manager starts a fresh one after its backoff delay.

use core::fmt;

use embedded_hal_async::delay::DelayNs;

use crate::config::{BRIDGE_RX_BUFFER, BridgeConfig};
use crate::protocol::{
    Command, FrameAccumulator, FrameOutcome, Info, MAX_FRAME_LEN, Message, encode_into,
};
use crate::session::{WakeReason, WakeSignal};
use crate::status::BridgeStatus;
use crate::time::duration_ms;

/// Stream connection to the remote peer.
#[allow(async_fn_in_trait)]
pub trait BridgeTransport {
    type Error: fmt::Debug;

    /// Opens the connection to the fixed endpoint.
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Writes all of `bytes`.
    async fn send(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Waits up to the per-tick budget for data. `Ok(0)` means nothing arrived;
    /// a peer close is reported as an error.
    async fn receive(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error>;

    async fn close(&mut self);
}

/// The inbound command queue was still full after the send timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueFull;

impl fmt::Display for QueueFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue full")
    }
}

/// Channel endpoints the bridge pumps.
#[allow(async_fn_in_trait)]
pub trait BridgeChannels {
    /// Next queued info report, without waiting.
    fn try_next_outbound(&mut self) -> Option<Info>;

    /// Enqueues a command, waiting at most `timeout_ms`.
    async fn deliver_inbound(&mut self, command: Command, timeout_ms: u32) -> Result<(), QueueFull>;
}

/// Why a bridge instance stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BridgeExit {
    ConnectFailed,
    SendFailed,
    ReceiveFailed,
}

/// A single bridge session.
pub struct SocketBridge<'a, T, C, D> {
    transport: T,
    channels: C,
    delay: D,
    wake: &'a WakeSignal,
    status: &'a BridgeStatus<'a>,
    config: BridgeConfig,
    frames: FrameAccumulator<BRIDGE_RX_BUFFER>,
}

impl<'a, T, C, D> SocketBridge<'a, T, C, D>
where
    T: BridgeTransport,
    C: BridgeChannels,
    D: DelayNs,
{
    pub fn new(
        transport: T,
        channels: C,
        delay: D,
        wake: &'a WakeSignal,
        status: &'a BridgeStatus<'a>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            transport,
            channels,
            delay,
            wake,
            status,
            config,
            frames: FrameAccumulator::new(),
        }
    }

    /// Connects and pumps until the transport fails.
    pub async fn run(mut self) -> BridgeExit {
        if self.transport.connect().await.is_err() {
            warn!("bridge: connect failed");
            return self.shut_down(BridgeExit::ConnectFailed).await;
        }
        info!("bridge: connected");
        self.status.record_connected();

        let mut rx = [0u8; BRIDGE_RX_BUFFER];
        loop {
            if let Err(exit) = self.pump_outbound().await {
                return self.shut_down(exit).await;
            }
            if let Err(exit) = self.pump_inbound(&mut rx).await {
                return self.shut_down(exit).await;
            }
            self.delay.delay_ms(duration_ms(self.config.tick)).await;
        }
    }

    async fn pump_outbound(&mut self) -> Result<(), BridgeExit> {
        let Some(info) = self.channels.try_next_outbound() else {
            return Ok(());
        };

        let mut frame = [0u8; MAX_FRAME_LEN];
        let Ok(len) = encode_into(&Message::Info(info), &mut frame) else {
            warn!("bridge: could not encode {}", info);
            return Ok(());
        };
        self.transport
            .send(&frame[..len])
            .await
            .map_err(|_| BridgeExit::SendFailed)
    }

    async fn pump_inbound(&mut self, rx: &mut [u8]) -> Result<(), BridgeExit> {
        let received = self
            .transport
            .receive(rx)
            .await
            .map_err(|_| BridgeExit::ReceiveFailed)?;
        if received == 0 {
            return Ok(());
        }

        let mut outcome = self.frames.push(&rx[..received]);
        loop {
            match outcome {
                FrameOutcome::Message(Message::Command(command)) => {
                    debug!("bridge: received {}", command);
                    let timeout_ms = duration_ms(self.config.send_timeout);
                    if self
                        .channels
                        .deliver_inbound(command, timeout_ms)
                        .await
                        .is_err()
                    {
                        warn!("bridge: inbound queue full, dropping {}", command);
                    }
                }
                FrameOutcome::Message(Message::Info(info)) => {
                    warn!("bridge: ignoring info from peer {}", info);
                }
                FrameOutcome::Pending => break,
                FrameOutcome::Dropped(error) => {
                    warn!("bridge: discarded inbound bytes: {}", error);
                }
            }
            outcome = self.frames.next_frame();
        }
        Ok(())
    }

    async fn shut_down(mut self, exit: BridgeExit) -> BridgeExit {
        self.transport.close().await;
        self.status.record_disconnected();
        self.wake.raise(WakeReason::SocketDisconnected);
        exit
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;
    use heapless::{Deque, Vec};

    use super::*;
    use crate::status::LinkStatus;
    use crate::time::mock::RecordingDelay;

    #[derive(Default)]
    struct ScriptedTransport {
        refuse_connect: bool,
        chunks: Deque<&'static [u8], 8>,
        sent: Vec<Vec<u8, MAX_FRAME_LEN>, 8>,
        closed: bool,
    }

    impl BridgeTransport for &mut ScriptedTransport {
        type Error = ();

        async fn connect(&mut self) -> Result<(), ()> {
            if self.refuse_connect { Err(()) } else { Ok(()) }
        }

        async fn send(&mut self, bytes: &[u8]) -> Result<(), ()> {
            self.sent
                .push(Vec::from_slice(bytes).map_err(|_| ())?)
                .map_err(|_| ())
        }

        // An exhausted script reads as the peer closing the socket.
        async fn receive(&mut self, buffer: &mut [u8]) -> Result<usize, ()> {
            let chunk = self.chunks.pop_front().ok_or(())?;
            buffer[..chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        }

        async fn close(&mut self) {
            self.closed = true;
        }
    }

    #[derive(Default)]
    struct QueueChannels {
        outbound: Deque<Info, 8>,
        inbound: Vec<Command, 8>,
        inbound_full: bool,
    }

    impl BridgeChannels for &mut QueueChannels {
        fn try_next_outbound(&mut self) -> Option<Info> {
            self.outbound.pop_front()
        }

        async fn deliver_inbound(&mut self, command: Command, _timeout_ms: u32) -> Result<(), QueueFull> {
            if self.inbound_full {
                return Err(QueueFull);
            }
            self.inbound.push(command).map_err(|_| QueueFull)
        }
    }

    fn run_bridge(
        transport: &mut ScriptedTransport,
        channels: &mut QueueChannels,
        wake: &WakeSignal,
        link: &LinkStatus,
    ) -> BridgeExit {
        let status = link.bridge_writer().unwrap();
        let bridge = SocketBridge::new(
            transport,
            channels,
            RecordingDelay::default(),
            wake,
            &status,
            BridgeConfig::DEFAULT,
        );
        block_on(bridge.run())
    }

    #[test]
    fn forwards_split_command_and_reports_disconnect() {
        let mut transport = ScriptedTransport::default();
        transport.chunks.push_back(br#"{"messageType":"COMMAND","#).unwrap();
        transport.chunks.push_back(br#""commandType":"ON"}"#).unwrap();
        let mut channels = QueueChannels::default();
        let wake = WakeSignal::new();
        let link = LinkStatus::new();

        let exit = run_bridge(&mut transport, &mut channels, &wake, &link);

        assert_eq!(exit, BridgeExit::ReceiveFailed);
        assert_eq!(channels.inbound.as_slice(), &[Command::On]);
        assert!(transport.closed);
        assert!(wake.take().contains(WakeReason::SocketDisconnected));
        let snapshot = link.snapshot();
        assert!(!snapshot.socket_connected);
        assert_eq!(snapshot.bridge_sessions, 1);
    }

    #[test]
    fn sends_one_info_per_tick() {
        let mut transport = ScriptedTransport::default();
        transport.chunks.push_back(b"").unwrap();
        let mut channels = QueueChannels::default();
        channels.outbound.push_back(Info::TurnedOn).unwrap();
        channels.outbound.push_back(Info::MotorStart).unwrap();
        channels.outbound.push_back(Info::MotorStop).unwrap();
        let wake = WakeSignal::new();
        let link = LinkStatus::new();

        run_bridge(&mut transport, &mut channels, &wake, &link);

        // Two ticks ran: the empty read, then the failing read.
        assert_eq!(transport.sent.len(), 2);
        assert_eq!(
            transport.sent[0].as_slice(),
            br#"{"messageType":"INFO","infoType":"TURNED_ON"}"#
        );
        assert_eq!(channels.outbound.len(), 1);
    }

    #[test]
    fn refused_connection_still_raises_disconnect() {
        let mut transport = ScriptedTransport {
            refuse_connect: true,
            ..ScriptedTransport::default()
        };
        let mut channels = QueueChannels::default();
        let wake = WakeSignal::new();
        let link = LinkStatus::new();

        let exit = run_bridge(&mut transport, &mut channels, &wake, &link);

        assert_eq!(exit, BridgeExit::ConnectFailed);
        assert!(wake.take().contains(WakeReason::SocketDisconnected));
        assert_eq!(link.snapshot().bridge_sessions, 0);
    }

    #[test]
    fn full_inbound_queue_drops_command_and_keeps_running() {
        let mut transport = ScriptedTransport::default();
        transport.chunks.push_back(br#"{"messageType":"COMMAND","commandType":"OFF"}"#).unwrap();
        transport.chunks.push_back(b"not json").unwrap();
        let mut channels = QueueChannels {
            inbound_full: true,
            ..QueueChannels::default()
        };
        let wake = WakeSignal::new();
        let link = LinkStatus::new();

        let exit = run_bridge(&mut transport, &mut channels, &wake, &link);

        assert_eq!(exit, BridgeExit::ReceiveFailed);
        assert!(channels.inbound.is_empty());
    }

    #[test]
    fn forwards_every_command_in_a_coalesced_read() {
        let mut transport = ScriptedTransport::default();
        transport
            .chunks
            .push_back(br#"{"messageType":"COMMAND","commandType":"ON"}{"messageType":"COMMAND","commandType":"OFF"}{"messageType":"COMMAND","#)
            .unwrap();
        transport.chunks.push_back(br#""commandType":"OFF_RELEASE"}"#).unwrap();
        let mut channels = QueueChannels::default();
        let wake = WakeSignal::new();
        let link = LinkStatus::new();

        run_bridge(&mut transport, &mut channels, &wake, &link);

        assert_eq!(
            channels.inbound.as_slice(),
            &[Command::On, Command::Off, Command::OffRelease]
        );
    }
}
