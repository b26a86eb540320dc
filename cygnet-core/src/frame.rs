//! The layered frame model.
//!
//! A [`Frame`] is the in-simulation unit of network data. It stacks a
//! link-layer header, a network-layer header, exactly one kind of upper-layer
//! content (transport payload, control message, or address resolution), and
//! application metadata. No wire encoding exists; frames move between
//! interfaces as in-process values, and a frame's [`size`](Frame::size) is an
//! estimate used only for link bandwidth accounting.

use crate::address::Ipv4Address;
use crate::message::Message;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;
use thiserror::Error as ThisError;

/// A hardware address. Unique per interface within a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Mac([u8; 6]);

impl Mac {
    /// The broadcast hardware address, `ff:ff:ff:ff:ff:ff`. Interfaces accept
    /// frames sent to it regardless of their own address, and switches flood
    /// it out every enabled port.
    pub const BROADCAST: Self = Self([0xff; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn is_broadcast(self) -> bool {
        self.0[0] == 0xff
            && self.0[1] == 0xff
            && self.0[2] == 0xff
            && self.0[3] == 0xff
            && self.0[4] == 0xff
            && self.0[5] == 0xff
    }
}

impl Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for Mac {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| FrameError::MalformedMac(s.to_string()))?;
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| FrameError::MalformedMac(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(FrameError::MalformedMac(s.to_string()));
        }
        Ok(Self(octets))
    }
}

/// Hands out unique hardware addresses in creation order, so rebuilding the
/// same topology yields the same addresses.
#[derive(Debug, Default)]
pub struct MacAllocator {
    next: u64,
}

impl MacAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> Mac {
        self.next += 1;
        let bytes = self.next.to_be_bytes();
        // 02:xx:xx:xx:xx:xx is a locally administered unicast prefix.
        Mac::new([0x02, bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]])
    }
}

/// The link-layer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkHeader {
    pub src: Mac,
    pub dst: Mac,
}

/// The protocol tag carried in the network-layer header.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum IpProtocol {
    Tcp,
    Udp,
    Icmp,
}

impl Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
            Self::Icmp => write!(f, "icmp"),
        }
    }
}

/// IP precedence. Higher values are more important traffic; the simulation
/// carries the field for observability but does not schedule by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Precedence {
    Routine,
    Priority,
    Immediate,
    Flash,
    FlashOverride,
    Critical,
}

impl Default for Precedence {
    fn default() -> Self {
        Self::Routine
    }
}

/// The network-layer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub src: Ipv4Address,
    pub dst: Ipv4Address,
    pub protocol: IpProtocol,
    /// Decremented on interface receive and again when a router forwards. A
    /// frame whose TTL reaches zero is dropped, never forwarded.
    pub ttl: u8,
    pub precedence: Precedence,
}

impl Ipv4Header {
    /// The default time-to-live for newly built frames.
    pub const DEFAULT_TTL: u8 = 64;
}

/// TCP-style transport flags. Unused for UDP traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags(u8);

impl TcpFlags {
    pub const NONE: Self = Self(0);
    pub const SYN: Self = Self(1 << 0);
    pub const ACK: Self = Self(1 << 1);
    pub const FIN: Self = Self(1 << 2);
    pub const RST: Self = Self(1 << 3);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// The transport-layer header. Present only on TCP and UDP frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub flags: TcpFlags,
}

/// The kind of control message carried by an ICMP frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpKind {
    EchoRequest,
    EchoReply,
}

/// The control-message header. Mutually exclusive with the transport header;
/// the [`FrameBody`] enum makes the invalid combination unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpHeader {
    pub kind: IcmpKind,
    pub code: u8,
    /// Correlates a reply with its request.
    pub sequence: u16,
}

/// An address-resolution exchange. Carried in place of upper-layer content;
/// the sender's own addressing rides in the link and network headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpPayload {
    /// "Who has `target`?" Broadcast at the link layer.
    Request { target: Ipv4Address },
    /// "`target` is at `mac`." Unicast back to the requester.
    Reply { target: Ipv4Address, mac: Mac },
}

/// Traffic classification for the application-metadata header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrafficOrigin {
    /// Legitimate background traffic.
    Green,
    /// Attacker traffic.
    Red,
    Unknown,
}

impl Default for TrafficOrigin {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Whether the payload arrived unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataIntegrity {
    Intact,
    Corrupt,
}

impl Default for DataIntegrity {
    fn default() -> Self {
        Self::Intact
    }
}

/// The application-metadata header, present on every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppHeader {
    pub origin: TrafficOrigin,
    pub integrity: DataIntegrity,
}

/// Upper-layer content. A frame carries exactly one variant, so a transport
/// header and a control-message header can never coexist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    Transport {
        header: TransportHeader,
        payload: Message,
    },
    Icmp(IcmpHeader),
    Arp(ArpPayload),
}

/// The in-simulation unit of layered network data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub link: LinkHeader,
    pub net: Ipv4Header,
    pub app: AppHeader,
    pub body: FrameBody,
}

const LINK_OVERHEAD: u32 = 14;
const NET_OVERHEAD: u32 = 20;
const TRANSPORT_OVERHEAD: u32 = 8;
const ICMP_OVERHEAD: u32 = 8;
const ARP_OVERHEAD: u32 = 28;

impl Frame {
    /// Builds a transport frame. The network-layer protocol tag must be TCP
    /// or UDP; tagging a transport body as ICMP is a construction error.
    pub fn transport(
        link: LinkHeader,
        net: Ipv4Header,
        app: AppHeader,
        header: TransportHeader,
        payload: Message,
    ) -> Result<Self, FrameError> {
        if net.protocol == IpProtocol::Icmp {
            return Err(FrameError::ProtocolMismatch);
        }
        Ok(Self {
            link,
            net,
            app,
            body: FrameBody::Transport { header, payload },
        })
    }

    /// Builds a control-message frame. The protocol tag is forced to ICMP.
    pub fn icmp(link: LinkHeader, mut net: Ipv4Header, icmp: IcmpHeader) -> Self {
        net.protocol = IpProtocol::Icmp;
        Self {
            link,
            net,
            app: AppHeader::default(),
            body: FrameBody::Icmp(icmp),
        }
    }

    /// Builds an address-resolution frame.
    ///
    /// ARP is dispatched before any ACL or routing step, so the network-layer
    /// protocol tag on these frames is never consulted.
    pub fn arp(link: LinkHeader, src: Ipv4Address, dst: Ipv4Address, arp: ArpPayload) -> Self {
        Self {
            link,
            net: Ipv4Header {
                src,
                dst,
                protocol: IpProtocol::Udp,
                ttl: Ipv4Header::DEFAULT_TTL,
                precedence: Precedence::Routine,
            },
            app: AppHeader::default(),
            body: FrameBody::Arp(arp),
        }
    }

    /// The frame's size in bytes, for bandwidth accounting.
    pub fn size(&self) -> u32 {
        let upper = match &self.body {
            FrameBody::Transport { payload, .. } => TRANSPORT_OVERHEAD + payload.len() as u32,
            FrameBody::Icmp(_) => ICMP_OVERHEAD,
            FrameBody::Arp(_) => ARP_OVERHEAD,
        };
        LINK_OVERHEAD + NET_OVERHEAD + upper
    }

    /// The transport ports, if the frame has a transport header.
    pub fn ports(&self) -> Option<(u16, u16)> {
        match &self.body {
            FrameBody::Transport { header, .. } => Some((header.src_port, header.dst_port)),
            _ => None,
        }
    }

    /// Whether the frame is part of an address-resolution exchange.
    pub fn is_arp(&self) -> bool {
        matches!(self.body, FrameBody::Arp(_))
    }
}

/// Why a frame was not delivered. Drops are terminal for the frame but are
/// silent from the simulation's perspective; they never halt stepping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DropReason {
    /// The receiving or sending interface was disabled.
    InterfaceDisabled,
    /// The interface has no link attached.
    NotConnected,
    /// The link or airspace had no spare bandwidth this tick.
    BandwidthExceeded,
    /// The frame's time-to-live reached zero.
    TtlExpired,
    /// An access control rule denied the traffic.
    AclDenied,
    /// No route table entry matched the destination.
    NoRoute,
    /// The sending node has no gateway for an off-subnet destination.
    NoGateway,
    /// No software was listening on the destination port.
    ClosedPort,
    /// The frame was not addressed to the receiving node.
    NotAddressed,
    /// The owning node was not powered on.
    PoweredOff,
}

impl Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::InterfaceDisabled => "interface disabled",
            Self::NotConnected => "not connected",
            Self::BandwidthExceeded => "bandwidth exceeded",
            Self::TtlExpired => "ttl expired",
            Self::AclDenied => "acl denied",
            Self::NoRoute => "no route",
            Self::NoGateway => "no gateway",
            Self::ClosedPort => "closed port",
            Self::NotAddressed => "not addressed",
            Self::PoweredOff => "powered off",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("malformed hardware address: {0:?}")]
    MalformedMac(String),
    #[error("the network-layer protocol tag contradicts the frame body")]
    ProtocolMismatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> LinkHeader {
        LinkHeader {
            src: Mac::new([2, 0, 0, 0, 0, 1]),
            dst: Mac::new([2, 0, 0, 0, 0, 2]),
        }
    }

    fn net(protocol: IpProtocol) -> Ipv4Header {
        Ipv4Header {
            src: Ipv4Address::new([10, 0, 0, 1]),
            dst: Ipv4Address::new([10, 0, 0, 2]),
            protocol,
            ttl: Ipv4Header::DEFAULT_TTL,
            precedence: Precedence::Routine,
        }
    }

    #[test]
    fn transport_body_rejects_icmp_tag() {
        let header = TransportHeader {
            src_port: 1024,
            dst_port: 80,
            flags: TcpFlags::NONE,
        };
        let result = Frame::transport(
            link(),
            net(IpProtocol::Icmp),
            AppHeader::default(),
            header,
            Message::new("hello"),
        );
        assert_eq!(result.unwrap_err(), FrameError::ProtocolMismatch);
    }

    #[test]
    fn icmp_constructor_forces_protocol_tag() {
        let frame = Frame::icmp(
            link(),
            net(IpProtocol::Tcp),
            IcmpHeader {
                kind: IcmpKind::EchoRequest,
                code: 0,
                sequence: 1,
            },
        );
        assert_eq!(frame.net.protocol, IpProtocol::Icmp);
    }

    #[test]
    fn size_counts_payload() {
        let header = TransportHeader {
            src_port: 1024,
            dst_port: 80,
            flags: TcpFlags::NONE,
        };
        let frame = Frame::transport(
            link(),
            net(IpProtocol::Udp),
            AppHeader::default(),
            header,
            Message::new("12345678"),
        )
        .unwrap();
        assert_eq!(frame.size(), 14 + 20 + 8 + 8);
    }

    #[test]
    fn mac_round_trips_through_display() {
        let mac = Mac::new([0x02, 0x00, 0xab, 0x00, 0x00, 0x07]);
        let parsed: Mac = mac.to_string().parse().unwrap();
        assert_eq!(parsed, mac);
        assert!("02:00:ab".parse::<Mac>().is_err());
    }

    #[test]
    fn allocator_is_sequential() {
        let mut allocator = MacAllocator::new();
        let first = allocator.allocate();
        let second = allocator.allocate();
        assert_ne!(first, second);
        assert!(!first.is_broadcast());
    }
}
