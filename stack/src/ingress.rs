//! Ingress pipeline - single entry point for all received frames.
//!
//! Every frame delivered by the link driver passes through [`net_rx`], which
//! parses the Ethernet header, filters by destination MAC, and dispatches to
//! the appropriate protocol handler (ARP, IPv4).

use log::debug;

use crate::netstack::NetStack;
use crate::packetbuf::PacketBuf;
use crate::types::{EtherType, MacAddr};
use crate::{ETH_HEADER_LEN, arp, ipv4};

/// Process one received frame.
///
/// # Processing steps
///
/// 1. Validate minimum Ethernet frame length
/// 2. Parse destination MAC and EtherType from the Ethernet header
/// 3. Filter: accept only frames addressed to our MAC, broadcast, or multicast
/// 4. Record the L3 layer offset on the [`PacketBuf`]
/// 5. Pull the Ethernet header
/// 6. Dispatch by EtherType: ARP → [`arp::handle_rx`], IPv4 → [`ipv4::handle_rx`]
///
/// Unknown EtherTypes are silently dropped.
pub fn net_rx(stack: &mut NetStack, mut pkt: PacketBuf) {
    let frame = pkt.payload();
    if frame.len() < ETH_HEADER_LEN {
        debug!("ingress: frame too short ({} < {})", frame.len(), ETH_HEADER_LEN);
        stack.stats.rx_dropped += 1;
        return;
    }

    let dst_mac = MacAddr([frame[0], frame[1], frame[2], frame[3], frame[4], frame[5]]);
    let ethertype_raw = u16::from_be_bytes([frame[12], frame[13]]);

    // Destination MAC filter: accept our MAC, broadcast, or multicast.
    if dst_mac != stack.config.mac && !dst_mac.is_broadcast() && !dst_mac.is_multicast() {
        return;
    }

    // L3 starts right after the Ethernet header (absolute buffer position).
    pkt.set_l3(pkt.head() + ETH_HEADER_LEN);

    if pkt.pull_header(ETH_HEADER_LEN).is_err() {
        return;
    }

    stack.stats.rx_frames += 1;

    match EtherType::from_u16(ethertype_raw) {
        Some(EtherType::Arp) => arp::handle_rx(stack, pkt),
        Some(EtherType::Ipv4) => ipv4::handle_rx(stack, pkt),
        Some(EtherType::Ipv6) => {
            // IPv6 not supported - silently drop.
        }
        None => {
            debug!("ingress: unknown EtherType 0x{:04x}, dropping", ethertype_raw);
            stack.stats.rx_dropped += 1;
        }
    }
}
