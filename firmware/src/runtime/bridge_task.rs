//! TCP leg of the socket bridge.

use compressor_core::bridge::{BridgeChannels, BridgeTransport, QueueFull, SocketBridge};
use compressor_core::config::{BRIDGE_RX_BUFFER, BridgeConfig};
use compressor_core::protocol::{Command, Info};
use compressor_core::status::BridgeStatus;
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpAddress, IpEndpoint, Stack};
use embassy_time::{Delay, Duration, with_timeout};
use embedded_io_async::Write;

use crate::channels::{INBOUND, OUTBOUND};
use crate::instant::to_embassy;
use crate::status::WAKE;

mod deployment {
    include!(concat!(env!("OUT_DIR"), "/deployment.rs"));
}

const TX_BUFFER: usize = 512;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum TransportError {
    Connect,
    Write,
    Read,
    /// The peer closed the connection.
    Closed,
}

/// Stream socket to the remote peer.
struct TcpTransport<'a> {
    socket: TcpSocket<'a>,
    endpoint: IpEndpoint,
    receive_budget: Duration,
}

impl BridgeTransport for TcpTransport<'_> {
    type Error = TransportError;

    async fn connect(&mut self) -> Result<(), TransportError> {
        match with_timeout(CONNECT_TIMEOUT, self.socket.connect(self.endpoint)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => {
                defmt::warn!("bridge: connect error {}", error);
                Err(TransportError::Connect)
            }
            Err(_) => Err(TransportError::Connect),
        }
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.socket
            .write_all(bytes)
            .await
            .map_err(|_| TransportError::Write)
    }

    async fn receive(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        match with_timeout(self.receive_budget, self.socket.read(buffer)).await {
            Err(_) => Ok(0),
            Ok(Ok(0)) => Err(TransportError::Closed),
            Ok(Ok(count)) => Ok(count),
            Ok(Err(_)) => Err(TransportError::Read),
        }
    }

    async fn close(&mut self) {
        self.socket.close();
        if with_timeout(CLOSE_TIMEOUT, self.socket.flush()).await.is_err() {
            self.socket.abort();
        }
    }
}

/// Bridge side of the static command and info queues.
struct QueueChannels;

impl BridgeChannels for QueueChannels {
    fn try_next_outbound(&mut self) -> Option<Info> {
        OUTBOUND.try_receive().ok()
    }

    async fn deliver_inbound(&mut self, command: Command, timeout_ms: u32) -> Result<(), QueueFull> {
        with_timeout(Duration::from_millis(u64::from(timeout_ms)), INBOUND.send(command))
            .await
            .map_err(|_| QueueFull)
    }
}

/// One bridge instance; the session manager spawns a new one after each exit.
#[embassy_executor::task(pool_size = 1)]
pub async fn run(stack: Stack<'static>, status: &'static BridgeStatus<'static>) {
    let config = BridgeConfig::DEFAULT;
    let mut rx_buffer = [0u8; BRIDGE_RX_BUFFER];
    let mut tx_buffer = [0u8; TX_BUFFER];
    let [a, b, c, d] = deployment::SERVER_ADDR;
    let transport = TcpTransport {
        socket: TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer),
        endpoint: IpEndpoint::new(IpAddress::v4(a, b, c, d), deployment::SERVER_PORT),
        receive_budget: to_embassy(config.tick),
    };

    defmt::info!("bridge: connecting to {}", transport.endpoint);
    let exit = SocketBridge::new(transport, QueueChannels, Delay, &WAKE, status, config)
        .run()
        .await;
    defmt::info!("bridge: exited ({})", exit);
}
