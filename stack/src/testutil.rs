//! Shared helpers for the test suites: a manual clock, a pre-wired stack,
//! and wire-format builders/parsers for injected and captured frames.

use std::cell::Cell;
use std::rc::Rc;
use std::vec::Vec;

use crate::clock::TimeSource;
use crate::netdev::QueueDriver;
use crate::netstack::{IfaceConfig, NetStack};
use crate::packetbuf::{PacketBuf, add_pseudo_header, fold_checksum, ones_complement_sum};
use crate::types::{Ipv4Addr, MacAddr};
use crate::{
    ARP_HLEN_ETHERNET, ARP_HTYPE_ETHERNET, ARP_PACKET_LEN, ARP_PLEN_IPV4, ARP_PTYPE_IPV4,
    ETH_HEADER_LEN, ETHERTYPE_ARP, ETHERTYPE_IPV4, ICMP_TYPE_ECHO_REQUEST, IP_DEFAULT_TTL,
    IPPROTO_UDP, IPV4_HEADER_LEN, UDP_HEADER_LEN,
};

pub const LOCAL_IP: Ipv4Addr = Ipv4Addr([192, 168, 1, 1]);
pub const LOCAL_MAC: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
pub const PEER_IP: Ipv4Addr = Ipv4Addr([192, 168, 1, 2]);
pub const PEER_MAC: MacAddr = MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);

// =============================================================================
// Manual clock
// =============================================================================

/// A hand-cranked [`TimeSource`].  Clones share the same instant.
#[derive(Clone)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(0)),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.now.set(self.now.get() + secs);
    }
}

impl TimeSource for ManualClock {
    fn now_secs(&self) -> u64 {
        self.now.get()
    }
}

// =============================================================================
// Stack construction
// =============================================================================

/// A stack on `192.168.1.1` / `00:11:22:33:44:55` with the init-time ARP
/// announcement already drained from the driver queue.
pub fn fresh_stack() -> (NetStack, QueueDriver, ManualClock) {
    let driver = QueueDriver::new();
    let clock = ManualClock::new();
    let stack = NetStack::new(
        IfaceConfig {
            ip: LOCAL_IP,
            mac: LOCAL_MAC,
        },
        Box::new(driver.clone()),
        Box::new(clock.clone()),
    );
    let announcement = driver.pop();
    assert!(announcement.is_some(), "init emits a gratuitous ARP request");
    (stack, driver, clock)
}

/// Teach the stack the peer's MAC by injecting an ARP reply.  Produces no
/// outbound frames (nothing is pending for the peer).
pub fn seed_arp(stack: &mut NetStack, ip: Ipv4Addr, mac: MacAddr) {
    let arp = arp_packet(crate::ARP_OPER_REPLY, mac, ip, LOCAL_MAC, LOCAL_IP);
    let frame = eth_frame(LOCAL_MAC, mac, ETHERTYPE_ARP, &arp);
    stack.handle_frame(&frame);
}

// =============================================================================
// Wire-format builders
// =============================================================================

pub fn eth_frame(dst: MacAddr, src: MacAddr, ethertype: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(ETH_HEADER_LEN + payload.len());
    frame.extend_from_slice(&dst.0);
    frame.extend_from_slice(&src.0);
    frame.extend_from_slice(&ethertype.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

pub fn arp_packet(
    oper: u16,
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) -> [u8; ARP_PACKET_LEN] {
    let mut arp = [0u8; ARP_PACKET_LEN];
    arp[0..2].copy_from_slice(&ARP_HTYPE_ETHERNET.to_be_bytes());
    arp[2..4].copy_from_slice(&ARP_PTYPE_IPV4.to_be_bytes());
    arp[4] = ARP_HLEN_ETHERNET;
    arp[5] = ARP_PLEN_IPV4;
    arp[6..8].copy_from_slice(&oper.to_be_bytes());
    arp[8..14].copy_from_slice(&sender_mac.0);
    arp[14..18].copy_from_slice(&sender_ip.0);
    arp[18..24].copy_from_slice(&target_mac.0);
    arp[24..28].copy_from_slice(&target_ip.0);
    arp
}

/// IPv4 header + payload with a correct header checksum.
pub fn ipv4_datagram(src: Ipv4Addr, dst: Ipv4Addr, proto: u8, payload: &[u8]) -> Vec<u8> {
    let total_len = (IPV4_HEADER_LEN + payload.len()) as u16;
    let mut hdr = [0u8; IPV4_HEADER_LEN];
    hdr[0] = 0x45;
    hdr[2..4].copy_from_slice(&total_len.to_be_bytes());
    hdr[4..6].copy_from_slice(&0x1234u16.to_be_bytes());
    hdr[8] = IP_DEFAULT_TTL;
    hdr[9] = proto;
    hdr[12..16].copy_from_slice(&src.0);
    hdr[16..20].copy_from_slice(&dst.0);
    let checksum = fold_checksum(ones_complement_sum(&hdr));
    hdr[10..12].copy_from_slice(&checksum.to_be_bytes());

    let mut datagram = Vec::with_capacity(IPV4_HEADER_LEN + payload.len());
    datagram.extend_from_slice(&hdr);
    datagram.extend_from_slice(payload);
    datagram
}

/// UDP header + payload with a correct pseudo-header checksum.
pub fn udp_datagram(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let udp_len = (UDP_HEADER_LEN + payload.len()) as u16;
    let mut segment = Vec::with_capacity(udp_len as usize);
    segment.extend_from_slice(&src_port.to_be_bytes());
    segment.extend_from_slice(&dst_port.to_be_bytes());
    segment.extend_from_slice(&udp_len.to_be_bytes());
    segment.extend_from_slice(&0u16.to_be_bytes());
    segment.extend_from_slice(payload);

    let mut sum = 0u32;
    add_pseudo_header(&mut sum, &src_ip, &dst_ip, IPPROTO_UDP, segment.len());
    sum = sum.wrapping_add(ones_complement_sum(&segment));
    let checksum = fold_checksum(sum);
    segment[6..8].copy_from_slice(&checksum.to_be_bytes());
    segment
}

/// A complete Ethernet frame carrying a UDP datagram from the peer to us.
pub fn udp_frame_from_peer(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let udp = udp_datagram(PEER_IP, LOCAL_IP, src_port, dst_port, payload);
    let ip = ipv4_datagram(PEER_IP, LOCAL_IP, IPPROTO_UDP, &udp);
    eth_frame(LOCAL_MAC, PEER_MAC, ETHERTYPE_IPV4, &ip)
}

/// ICMP echo request message with a correct checksum.
pub fn icmp_echo_request(ident: u16, seq: u16, payload: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(8 + payload.len());
    msg.push(ICMP_TYPE_ECHO_REQUEST);
    msg.push(0);
    msg.extend_from_slice(&0u16.to_be_bytes());
    msg.extend_from_slice(&ident.to_be_bytes());
    msg.extend_from_slice(&seq.to_be_bytes());
    msg.extend_from_slice(payload);
    let checksum = fold_checksum(ones_complement_sum(&msg));
    msg[2..4].copy_from_slice(&checksum.to_be_bytes());
    msg
}

// =============================================================================
// Captured-frame parsers
// =============================================================================

pub struct TxFrame {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
    pub payload: Vec<u8>,
}

pub fn parse_tx(pkt: &PacketBuf) -> TxFrame {
    let frame = pkt.payload();
    assert!(frame.len() >= ETH_HEADER_LEN, "short TX frame");
    TxFrame {
        dst: MacAddr(frame[0..6].try_into().unwrap()),
        src: MacAddr(frame[6..12].try_into().unwrap()),
        ethertype: u16::from_be_bytes([frame[12], frame[13]]),
        payload: frame[ETH_HEADER_LEN..].to_vec(),
    }
}

pub struct IpView {
    pub total_len: u16,
    pub ident: u16,
    pub flags_frag: u16,
    pub proto: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub payload: Vec<u8>,
}

pub fn parse_ip(datagram: &[u8]) -> IpView {
    assert!(datagram.len() >= IPV4_HEADER_LEN, "short IP datagram");
    IpView {
        total_len: u16::from_be_bytes([datagram[2], datagram[3]]),
        ident: u16::from_be_bytes([datagram[4], datagram[5]]),
        flags_frag: u16::from_be_bytes([datagram[6], datagram[7]]),
        proto: datagram[9],
        src: Ipv4Addr(datagram[12..16].try_into().unwrap()),
        dst: Ipv4Addr(datagram[16..20].try_into().unwrap()),
        payload: datagram[IPV4_HEADER_LEN..].to_vec(),
    }
}

pub struct UdpView {
    pub src_port: u16,
    pub dst_port: u16,
    pub len: u16,
    pub checksum: u16,
    pub payload: Vec<u8>,
}

pub fn parse_udp(segment: &[u8]) -> UdpView {
    assert!(segment.len() >= UDP_HEADER_LEN, "short UDP segment");
    UdpView {
        src_port: u16::from_be_bytes([segment[0], segment[1]]),
        dst_port: u16::from_be_bytes([segment[2], segment[3]]),
        len: u16::from_be_bytes([segment[4], segment[5]]),
        checksum: u16::from_be_bytes([segment[6], segment[7]]),
        payload: segment[UDP_HEADER_LEN..].to_vec(),
    }
}

/// Recompute a captured UDP segment's checksum and compare to the stored one.
pub fn udp_checksum_valid(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, segment: &[u8]) -> bool {
    let stored = u16::from_be_bytes([segment[6], segment[7]]);
    let mut sum = 0u32;
    add_pseudo_header(&mut sum, &src_ip, &dst_ip, IPPROTO_UDP, segment.len());
    sum = sum.wrapping_add(ones_complement_sum(&segment[..6]));
    sum = sum.wrapping_add(ones_complement_sum(&segment[8..]));
    fold_checksum(sum) == stored
}
