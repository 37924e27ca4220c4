//! ARP - request/reply processing, cache maintenance, and the
//! resolve-or-queue primitive used by the IPv4 egress path.
//!
//! Incoming ARP frames are parsed, validated, and folded into the resolution
//! cache.  A frame that resolves an address with a queued datagram flushes
//! that datagram immediately; a request for our address gets a unicast reply.
//! Outbound IPv4 datagrams with no cached MAC are parked (one per
//! destination) while a single request is in flight.

use log::debug;

use crate::ethernet;
use crate::netstack::NetStack;
use crate::packetbuf::PacketBuf;
use crate::types::{EtherType, Ipv4Addr, MacAddr, NetError};
use crate::{
    ARP_HLEN_ETHERNET, ARP_HTYPE_ETHERNET, ARP_OPER_REPLY, ARP_OPER_REQUEST, ARP_PACKET_LEN,
    ARP_PLEN_IPV4, ARP_PTYPE_IPV4,
};

/// Seconds a resolved entry stays usable before a lookup treats it as stale.
pub const ARP_CACHE_TTL_SECS: u64 = 60;

/// Seconds a queued datagram waits for resolution.  Doubles as the minimum
/// interval between requests for the same destination.
pub const ARP_PENDING_TTL_SECS: u64 = 1;

/// Resolution cache capacity.
pub(crate) const ARP_CACHE_CAPACITY: usize = 256;

/// Pending-send queue capacity (one datagram per destination).
pub(crate) const ARP_PENDING_CAPACITY: usize = 64;

// =============================================================================
// Inbound
// =============================================================================

/// Handle an incoming ARP frame.
///
/// The packet's head points at the first byte of the ARP packet (Ethernet
/// header already consumed by the ingress pipeline).  After validation:
///
/// 1. The sender's `(IP, MAC)` binding is upserted into the cache.
/// 2. A datagram queued for the sender is transmitted to the learned MAC and
///    the pending entry removed - and nothing else happens, even if the frame
///    was also a request for our address.
/// 3. Otherwise, a request targeting our address gets a reply.
pub fn handle_rx(stack: &mut NetStack, pkt: PacketBuf) {
    let data = pkt.payload();
    if data.len() < ARP_PACKET_LEN {
        debug!("arp: frame too short ({} < {})", data.len(), ARP_PACKET_LEN);
        return;
    }

    let htype = u16::from_be_bytes([data[0], data[1]]);
    let ptype = u16::from_be_bytes([data[2], data[3]]);
    let hlen = data[4];
    let plen = data[5];
    let oper = u16::from_be_bytes([data[6], data[7]]);

    if htype != ARP_HTYPE_ETHERNET
        || ptype != ARP_PTYPE_IPV4
        || hlen != ARP_HLEN_ETHERNET
        || plen != ARP_PLEN_IPV4
        || (oper != ARP_OPER_REQUEST && oper != ARP_OPER_REPLY)
    {
        debug!(
            "arp: malformed packet (htype={}, ptype=0x{:04x}, hlen={}, plen={}, oper={})",
            htype, ptype, hlen, plen, oper
        );
        return;
    }

    let sender_mac = MacAddr([data[8], data[9], data[10], data[11], data[12], data[13]]);
    let sender_ip = Ipv4Addr([data[14], data[15], data[16], data[17]]);
    let target_ip = Ipv4Addr([data[24], data[25], data[26], data[27]]);

    let now = stack.clock.now_secs();
    stack.arp_cache.insert(sender_ip, sender_mac, now);

    // A queued datagram takes precedence over answering a request: flush it
    // to the freshly learned MAC and stop.
    if let Some(queued) = stack.arp_pending.remove(&sender_ip, now) {
        debug!("arp: flushing queued datagram for {} ({})", sender_ip, sender_mac);
        let _ = ethernet::transmit(stack, queued, sender_mac, EtherType::Ipv4);
        return;
    }

    if oper == ARP_OPER_REQUEST && target_ip == stack.config.ip {
        debug!("arp: request for our IP from {} ({}), replying", sender_ip, sender_mac);
        send_reply(stack, sender_ip, sender_mac);
    }
}

// =============================================================================
// Outbound
// =============================================================================

/// Build the 28-byte ARP packet.  The hardware/protocol constants and our
/// own identity form the template; opcode and target fields vary per call.
fn build_packet(
    stack: &NetStack,
    oper: u16,
    target_ip: Ipv4Addr,
    target_mac: MacAddr,
) -> [u8; ARP_PACKET_LEN] {
    let mut arp = [0u8; ARP_PACKET_LEN];
    arp[0..2].copy_from_slice(&ARP_HTYPE_ETHERNET.to_be_bytes());
    arp[2..4].copy_from_slice(&ARP_PTYPE_IPV4.to_be_bytes());
    arp[4] = ARP_HLEN_ETHERNET;
    arp[5] = ARP_PLEN_IPV4;
    arp[6..8].copy_from_slice(&oper.to_be_bytes());
    arp[8..14].copy_from_slice(&stack.config.mac.0);
    arp[14..18].copy_from_slice(&stack.config.ip.0);
    arp[18..24].copy_from_slice(&target_mac.0);
    arp[24..28].copy_from_slice(&target_ip.0);
    arp
}

/// Broadcast an ARP request for `target_ip`.  The target MAC field stays zero.
pub fn send_request(stack: &mut NetStack, target_ip: Ipv4Addr) {
    let arp = build_packet(stack, ARP_OPER_REQUEST, target_ip, MacAddr::ZERO);
    let mut pkt = PacketBuf::alloc();
    pkt.append(&arp);

    debug!("arp: sending request for {}", target_ip);
    let _ = ethernet::transmit(stack, pkt, MacAddr::BROADCAST, EtherType::Arp);
}

/// Send a unicast ARP reply to `target_mac`, filling both target fields.
pub fn send_reply(stack: &mut NetStack, target_ip: Ipv4Addr, target_mac: MacAddr) {
    let arp = build_packet(stack, ARP_OPER_REPLY, target_ip, target_mac);
    let mut pkt = PacketBuf::alloc();
    pkt.append(&arp);

    debug!("arp: sending reply to {} ({})", target_ip, target_mac);
    let _ = ethernet::transmit(stack, pkt, target_mac, EtherType::Arp);
}

/// Resolve-or-queue: hand `pkt` to the link if `dst_ip` has a cached MAC,
/// otherwise park it and broadcast a request.
///
/// At most one datagram waits per destination: while a resolution is in
/// flight, further datagrams to the same address are dropped.  This both
/// rate-limits request storms and bounds the queue.
pub fn resolve_out(stack: &mut NetStack, pkt: PacketBuf, dst_ip: Ipv4Addr) -> Result<(), NetError> {
    let now = stack.clock.now_secs();

    if let Some(mac) = stack.arp_cache.get(&dst_ip, now).copied() {
        return ethernet::transmit(stack, pkt, mac, EtherType::Ipv4);
    }

    if stack.arp_pending.contains(&dst_ip, now) {
        debug!("arp: resolution for {} already in flight, dropping datagram", dst_ip);
        stack.stats.tx_dropped += 1;
        return Ok(());
    }

    stack.arp_pending.insert(dst_ip, pkt, now);
    send_request(stack, dst_ip);
    Ok(())
}

/// Announce our own binding: a gratuitous broadcast request for our IP.
pub fn announce(stack: &mut NetStack) {
    let our_ip = stack.config.ip;
    send_request(stack, our_ip);
}
