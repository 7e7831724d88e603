//! DHCP responder for the provisioning access point.
//!
//! Only the DISCOVER/OFFER and REQUEST/ACK exchanges are served. Leases are
//! keyed by hardware address and never expire while the access point is up.

use heapless::Vec;
use winnow::ModalResult;
use winnow::binary::{be_u8, be_u16, be_u32};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::take;

/// Server port.
pub const DHCP_SERVER_PORT: u16 = 67;
/// Client port replies are sent to.
pub const DHCP_CLIENT_PORT: u16 = 68;

/// Addresses handed out.
pub const LEASE_POOL_LEN: usize = 8;

/// Smallest reply size BOOTP relays accept.
pub const MIN_REPLY_LEN: usize = 300;

const MAGIC_COOKIE: u32 = 0x6382_5363;
const FIXED_LEN: usize = 236;

const OPT_PAD: u8 = 0;
const OPT_SUBNET_MASK: u8 = 1;
const OPT_ROUTER: u8 = 3;
const OPT_DNS: u8 = 6;
const OPT_REQUESTED_IP: u8 = 50;
const OPT_LEASE_TIME: u8 = 51;
const OPT_MESSAGE_TYPE: u8 = 53;
const OPT_SERVER_ID: u8 = 54;
const OPT_END: u8 = 255;

/// Addressing of the provisioning network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DhcpServerConfig {
    pub server: [u8; 4],
    pub netmask: [u8; 4],
    /// First address of the pool; subsequent leases count up from here.
    pub pool_start: [u8; 4],
    pub lease_secs: u32,
}

impl DhcpServerConfig {
    pub const DEFAULT: Self = Self {
        server: [192, 168, 4, 1],
        netmask: [255, 255, 255, 0],
        pool_start: [192, 168, 4, 16],
        lease_secs: 86_400,
    };
}

impl Default for DhcpServerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageType {
    Discover,
    Offer,
    Request,
    Decline,
    Ack,
    Nak,
    Release,
    Inform,
}

impl MessageType {
    const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::Discover,
            2 => Self::Offer,
            3 => Self::Request,
            4 => Self::Decline,
            5 => Self::Ack,
            6 => Self::Nak,
            7 => Self::Release,
            8 => Self::Inform,
            _ => return None,
        })
    }

    const fn code(self) -> u8 {
        match self {
            Self::Discover => 1,
            Self::Offer => 2,
            Self::Request => 3,
            Self::Decline => 4,
            Self::Ack => 5,
            Self::Nak => 6,
            Self::Release => 7,
            Self::Inform => 8,
        }
    }
}

/// Fields of a client message the responder acts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientMessage {
    pub xid: u32,
    pub flags: u16,
    pub ciaddr: [u8; 4],
    pub giaddr: [u8; 4],
    pub chaddr: [u8; 6],
    pub kind: Option<MessageType>,
    pub requested_ip: Option<[u8; 4]>,
    pub server_id: Option<[u8; 4]>,
}

fn ipv4(input: &mut &[u8]) -> ModalResult<[u8; 4]> {
    be_u32.map(u32::to_be_bytes).parse_next(input)
}

fn option_ipv4(value: &[u8]) -> Option<[u8; 4]> {
    value.try_into().ok()
}

fn client_message(input: &mut &[u8]) -> ModalResult<(ClientMessage, [u8; 3])> {
    let op = be_u8.parse_next(input)?;
    let htype = be_u8.parse_next(input)?;
    let hlen = be_u8.parse_next(input)?;
    let _hops = be_u8.parse_next(input)?;
    let xid = be_u32.parse_next(input)?;
    let _secs = be_u16.parse_next(input)?;
    let flags = be_u16.parse_next(input)?;
    let ciaddr = ipv4(input)?;
    let _yiaddr = ipv4(input)?;
    let _siaddr = ipv4(input)?;
    let giaddr = ipv4(input)?;
    let hardware: &[u8] = take(16usize).parse_next(input)?;
    take(192usize).void().parse_next(input)?;
    be_u32
        .verify(|cookie: &u32| *cookie == MAGIC_COOKIE)
        .void()
        .parse_next(input)?;

    let mut chaddr = [0u8; 6];
    chaddr.copy_from_slice(&hardware[..6]);
    let mut message = ClientMessage {
        xid,
        flags,
        ciaddr,
        giaddr,
        chaddr,
        kind: None,
        requested_ip: None,
        server_id: None,
    };

    while let Ok(code) = be_u8::<_, ContextError>.parse_next(input) {
        match code {
            OPT_PAD => continue,
            OPT_END => break,
            _ => {}
        }
        let len = be_u8.parse_next(input)?;
        let value: &[u8] = take(len).parse_next(input)?;
        match code {
            OPT_MESSAGE_TYPE => {
                message.kind = value.first().copied().and_then(MessageType::from_code);
            }
            OPT_REQUESTED_IP => message.requested_ip = option_ipv4(value),
            OPT_SERVER_ID => message.server_id = option_ipv4(value),
            _ => {}
        }
    }

    Ok((message, [op, htype, hlen]))
}

/// Parses a client-to-server DHCP message from an ethernet client.
#[must_use]
pub fn parse_client_message(packet: &[u8]) -> Option<ClientMessage> {
    let (message, header) = client_message.parse_next(&mut &packet[..]).ok()?;
    (header == [1, 1, 6]).then_some(message)
}

/// Lease table and reply builder.
pub struct DhcpServer {
    config: DhcpServerConfig,
    leases: Vec<[u8; 6], LEASE_POOL_LEN>,
}

impl DhcpServer {
    #[must_use]
    pub const fn new(config: DhcpServerConfig) -> Self {
        Self {
            config,
            leases: Vec::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DhcpServerConfig {
        &self.config
    }

    /// Address leased to `mac`, if any.
    #[must_use]
    pub fn lease_for(&self, mac: &[u8; 6]) -> Option<[u8; 4]> {
        self.leases
            .iter()
            .position(|leased| leased == mac)
            .map(|slot| self.address(slot))
    }

    /// Forgets every lease.
    pub fn clear(&mut self) {
        self.leases.clear();
    }

    fn address(&self, slot: usize) -> [u8; 4] {
        let mut address = self.config.pool_start;
        // Pool is smaller than 256, so the slot always fits.
        address[3] = address[3].wrapping_add(u8::try_from(slot).unwrap_or(u8::MAX));
        address
    }

    fn allocate(&mut self, mac: &[u8; 6]) -> Option<[u8; 4]> {
        if let Some(address) = self.lease_for(mac) {
            return Some(address);
        }
        self.leases.push(*mac).ok()?;
        Some(self.address(self.leases.len() - 1))
    }

    /// Handles one datagram, writing any reply into `out`.
    ///
    /// Returns the reply length, or `None` when nothing should be sent.
    pub fn handle(&mut self, packet: &[u8], out: &mut [u8]) -> Option<usize> {
        let message = parse_client_message(packet)?;
        match message.kind? {
            MessageType::Discover => {
                let Some(address) = self.allocate(&message.chaddr) else {
                    warn!("dhcp: lease pool exhausted");
                    return None;
                };
                self.reply(&message, MessageType::Offer, address, out)
            }
            MessageType::Request => {
                if message
                    .server_id
                    .is_some_and(|server| server != self.config.server)
                {
                    return None;
                }
                let wanted = message
                    .requested_ip
                    .or_else(|| (message.ciaddr != [0; 4]).then_some(message.ciaddr));
                match (self.allocate(&message.chaddr), wanted) {
                    (Some(address), Some(wanted)) if address == wanted => {
                        debug!("dhcp: ack {}", address);
                        self.reply(&message, MessageType::Ack, address, out)
                    }
                    (Some(address), None) => self.reply(&message, MessageType::Ack, address, out),
                    _ => self.reply(&message, MessageType::Nak, [0; 4], out),
                }
            }
            _ => None,
        }
    }

    fn reply(
        &self,
        message: &ClientMessage,
        kind: MessageType,
        yiaddr: [u8; 4],
        out: &mut [u8],
    ) -> Option<usize> {
        let mut writer = Writer { out, len: 0 };
        writer.put(&[2, 1, 6, 0])?;
        writer.put(&message.xid.to_be_bytes())?;
        writer.put(&[0, 0])?;
        writer.put(&message.flags.to_be_bytes())?;
        writer.put(&[0; 4])?;
        writer.put(&yiaddr)?;
        writer.put(&self.config.server)?;
        writer.put(&message.giaddr)?;
        writer.put(&message.chaddr)?;
        writer.zeros(FIXED_LEN - writer.len)?;
        writer.put(&MAGIC_COOKIE.to_be_bytes())?;

        writer.put(&[OPT_MESSAGE_TYPE, 1, kind.code()])?;
        writer.option(OPT_SERVER_ID, &self.config.server)?;
        if kind != MessageType::Nak {
            writer.option(OPT_LEASE_TIME, &self.config.lease_secs.to_be_bytes())?;
            writer.option(OPT_SUBNET_MASK, &self.config.netmask)?;
            writer.option(OPT_ROUTER, &self.config.server)?;
            writer.option(OPT_DNS, &self.config.server)?;
        }
        writer.put(&[OPT_END])?;
        if writer.len < MIN_REPLY_LEN {
            writer.zeros(MIN_REPLY_LEN - writer.len)?;
        }
        Some(writer.len)
    }
}

struct Writer<'a> {
    out: &'a mut [u8],
    len: usize,
}

impl Writer<'_> {
    fn put(&mut self, bytes: &[u8]) -> Option<()> {
        let end = self.len + bytes.len();
        self.out.get_mut(self.len..end)?.copy_from_slice(bytes);
        self.len = end;
        Some(())
    }

    fn zeros(&mut self, count: usize) -> Option<()> {
        let end = self.len + count;
        self.out.get_mut(self.len..end)?.fill(0);
        self.len = end;
        Some(())
    }

    fn option(&mut self, code: u8, value: &[u8]) -> Option<()> {
        let len = u8::try_from(value.len()).ok()?;
        self.put(&[code, len])?;
        self.put(value)
    }
}
