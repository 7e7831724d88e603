//! HTTP configuration page and DHCP responder for the provisioning network.
//!
//! Both servers idle until the session manager brings the access point up.

use compressor_core::provisioning::dhcp::{DHCP_CLIENT_PORT, DHCP_SERVER_PORT};
use compressor_core::provisioning::http::{HTTP_PORT, MAX_REQUEST_LEN, MAX_RESPONSE_LEN};
use compressor_core::provisioning::{DhcpServer, DhcpServerConfig, HttpError, handle_request};
use compressor_core::settings::SettingsRequest;
use embassy_futures::select::{Either, select};
use embassy_net::tcp::TcpSocket;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpAddress, IpEndpoint, Ipv4Address, Stack};
use embassy_time::{Duration, Timer, with_timeout};
use embedded_io_async::Write;

use crate::channels::SETTINGS_REQUESTS;
use crate::status::{LINK, scan_table};

const IDLE_POLL: Duration = Duration::from_millis(500);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);
const DHCP_PACKET_LEN: usize = 576;

fn access_point_active() -> bool {
    LINK.snapshot().access_point_active
}

async fn access_point_down() {
    while access_point_active() {
        Timer::after(IDLE_POLL).await;
    }
}

#[embassy_executor::task]
pub async fn http(stack: Stack<'static>) -> ! {
    let mut rx = [0u8; MAX_REQUEST_LEN];
    let mut tx = [0u8; MAX_RESPONSE_LEN];
    let mut request = [0u8; MAX_REQUEST_LEN];
    let mut response = [0u8; MAX_RESPONSE_LEN];

    loop {
        if !access_point_active() {
            Timer::after(IDLE_POLL).await;
            continue;
        }

        let mut socket = TcpSocket::new(stack, &mut rx, &mut tx);
        socket.set_timeout(Some(CLIENT_TIMEOUT));
        let accepted = select(socket.accept(HTTP_PORT), access_point_down()).await;
        match accepted {
            Either::First(Ok(())) => {}
            Either::First(Err(error)) => {
                defmt::warn!("http: accept failed: {}", error);
                continue;
            }
            Either::Second(()) => {
                defmt::info!("http: provisioning network down, no longer listening");
                socket.abort();
                continue;
            }
        }

        let mut filled = 0;
        let exchange = loop {
            match socket.read(&mut request[filled..]).await {
                Ok(0) => break Err(HttpError::Incomplete),
                Ok(n) => filled += n,
                Err(error) => {
                    defmt::debug!("http: read failed: {}", error);
                    break Err(HttpError::Incomplete);
                }
            }
            match handle_request(
                &request[..filled],
                &scan_table(),
                access_point_active(),
                &mut response,
            ) {
                Err(HttpError::Incomplete) if filled < request.len() => {}
                outcome => break outcome,
            }
        };

        match exchange {
            Ok(exchange) => {
                if let Err(error) = socket.write_all(&response[..exchange.response_len]).await {
                    defmt::debug!("http: write failed: {}", error);
                }
                if let Some(credentials) = exchange.submitted {
                    if !access_point_active() {
                        defmt::info!("http: provisioning ended, discarding submitted credentials");
                        socket.abort();
                        continue;
                    }
                    defmt::info!("http: credentials submitted for {}", credentials.ssid.as_str());
                    SETTINGS_REQUESTS
                        .send(SettingsRequest::SetCredentials(credentials))
                        .await;
                }
            }
            Err(error) => defmt::debug!("http: dropping request: {}", error),
        }

        socket.close();
        if with_timeout(CLIENT_TIMEOUT, socket.flush()).await.is_err() {
            socket.abort();
        }
    }
}

#[embassy_executor::task]
pub async fn dhcp(stack: Stack<'static>) -> ! {
    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx = [0u8; DHCP_PACKET_LEN * 2];
    let mut tx = [0u8; DHCP_PACKET_LEN * 2];
    let mut packet = [0u8; DHCP_PACKET_LEN];
    let mut reply = [0u8; DHCP_PACKET_LEN];

    let mut socket = UdpSocket::new(stack, &mut rx_meta, &mut rx, &mut tx_meta, &mut tx);
    if let Err(error) = socket.bind(DHCP_SERVER_PORT) {
        defmt::error!("dhcp: bind failed: {}", error);
    }
    let broadcast = IpEndpoint::new(IpAddress::Ipv4(Ipv4Address::BROADCAST), DHCP_CLIENT_PORT);

    let mut server = DhcpServer::new(DhcpServerConfig::DEFAULT);
    let mut serving = false;
    loop {
        if !access_point_active() {
            if serving {
                defmt::info!("dhcp: provisioning network down, clearing leases");
                server.clear();
                serving = false;
            }
            Timer::after(IDLE_POLL).await;
            continue;
        }
        serving = true;

        let (len, _) = match with_timeout(IDLE_POLL, socket.recv_from(&mut packet)).await {
            Err(_) => continue,
            Ok(Err(error)) => {
                defmt::debug!("dhcp: receive failed: {}", error);
                continue;
            }
            Ok(Ok(received)) => received,
        };

        let Some(reply_len) = server.handle(&packet[..len], &mut reply) else {
            continue;
        };
        if let Err(error) = socket.send_to(&reply[..reply_len], broadcast).await {
            defmt::debug!("dhcp: send failed: {}", error);
        }
    }
}
