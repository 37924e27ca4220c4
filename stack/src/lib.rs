//! lanstack - a small userspace ARP/IPv4/UDP network stack.
//!
//! Three cooperating protocol state machines over an Ethernet-like link:
//! address resolution with pending-send buffering, IPv4 with transmit-side
//! fragmentation, and UDP with a per-port handler registry.  ICMP answers
//! echo requests and reports unreachable protocols and ports.
//!
//! One [`NetStack`] object owns all shared state; the link driver feeds
//! received frames into [`NetStack::handle_frame`] and receives fully framed
//! packets through the [`LinkDriver`] trait.  Processing is single-threaded
//! and cooperative: no operation suspends, and handlers run synchronously
//! inside the receive call chain.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod arp;
pub mod clock;
pub mod ethernet;
pub mod icmp;
pub mod ingress;
pub mod ipv4;
pub mod netdev;
pub mod netstack;
pub mod packetbuf;
pub mod ttlmap;
pub mod types;
pub mod udp;

#[cfg(test)]
mod testutil;


pub use clock::TimeSource;
pub use netdev::{LinkDriver, LinkFeatures, QueueDriver};
pub use netstack::{IfaceConfig, NetStack, StackStats};
pub use packetbuf::PacketBuf;
pub use types::{EtherType, IpProtocol, Ipv4Addr, MacAddr, NetError, Port};

// =============================================================================
// Ethernet
// =============================================================================

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;
pub const ETH_HEADER_LEN: usize = 14;
pub const ETH_ADDR_LEN: usize = 6;

// =============================================================================
// ARP (Ethernet + IPv4 only)
// =============================================================================

pub const ARP_HTYPE_ETHERNET: u16 = 1;
pub const ARP_PTYPE_IPV4: u16 = ETHERTYPE_IPV4;
pub const ARP_HLEN_ETHERNET: u8 = 6;
pub const ARP_PLEN_IPV4: u8 = 4;
pub const ARP_OPER_REQUEST: u16 = 1;
pub const ARP_OPER_REPLY: u16 = 2;
pub const ARP_PACKET_LEN: usize = 28;

// =============================================================================
// IPv4
// =============================================================================

pub const IPV4_HEADER_LEN: usize = 20;
pub const IP_DEFAULT_TTL: u8 = 64;
pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

/// Link MTU in bytes (IP header plus payload).
pub const MTU: usize = 1500;

// =============================================================================
// UDP
// =============================================================================

pub const UDP_HEADER_LEN: usize = 8;

// =============================================================================
// ICMP
// =============================================================================

pub const ICMP_HEADER_LEN: usize = 8;
pub const ICMP_TYPE_ECHO_REPLY: u8 = 0;
pub const ICMP_TYPE_UNREACHABLE: u8 = 3;
pub const ICMP_TYPE_ECHO_REQUEST: u8 = 8;
pub const ICMP_CODE_PROTOCOL_UNREACH: u8 = 2;
pub const ICMP_CODE_PORT_UNREACH: u8 = 3;
