//! IPv4 ingress and egress.
//!
//! [`handle_rx`] validates inbound datagrams (version, lengths, header
//! checksum, destination) and dispatches by protocol number through the
//! registered handler table; a protocol nobody handles earns the sender an
//! ICMP protocol-unreachable.
//!
//! [`send`] is the egress entry point: datagrams that fit in the MTU go out
//! whole, larger ones are split into 8-byte-aligned fragments that share one
//! identification value.  Every outbound datagram ends at
//! [`arp::resolve_out`](crate::arp::resolve_out), which defers transmission
//! until the next hop's MAC is known.

use bitflags::bitflags;
use log::debug;

use crate::arp;
use crate::icmp;
use crate::netdev::LinkFeatures;
use crate::netstack::NetStack;
use crate::packetbuf::PacketBuf;
use crate::types::{IpProtocol, Ipv4Addr, NetError};
use crate::{ICMP_CODE_PROTOCOL_UNREACH, IP_DEFAULT_TTL, IPV4_HEADER_LEN, MTU};

bitflags! {
    /// Flag bits of the IPv4 flags+fragment-offset word.
    ///
    /// The low 13 bits of the word carry the fragment offset in 8-byte units.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct IpFlags: u16 {
        /// More fragments follow this one.
        const MORE_FRAGMENTS = 0x2000;
        /// Fragmentation forbidden.
        const DONT_FRAGMENT = 0x4000;
    }
}

/// Mask for the fragment-offset bits of the flags+offset word.
pub const FRAG_OFFSET_MASK: u16 = 0x1FFF;

/// Largest payload carried by a single unfragmented datagram.
const MAX_FRAGMENT_PAYLOAD: usize = MTU - IPV4_HEADER_LEN;

// =============================================================================
// Ingress
// =============================================================================

/// Handle an incoming IPv4 datagram.
///
/// The packet's head points at the IP header (Ethernet header consumed by
/// the ingress pipeline).
///
/// # Validation
///
/// 1. At least 20 bytes of header
/// 2. Version 4, IHL 5 (options are neither produced nor parsed)
/// 3. Declared total length fits the buffer
/// 4. Header checksum verifies (skipped when the driver does it in hardware)
/// 5. Destination is our address
///
/// Datagrams failing any check are silently dropped with a debug log.
/// Trailing link padding beyond the declared total length is trimmed before
/// dispatch.
pub fn handle_rx(stack: &mut NetStack, mut pkt: PacketBuf) {
    let (proto, src_ip, dst_ip, stored_checksum, total_len) = {
        let data = pkt.payload();
        if data.len() < IPV4_HEADER_LEN {
            debug!("ipv4: datagram too short ({} < {})", data.len(), IPV4_HEADER_LEN);
            return;
        }

        let version = data[0] >> 4;
        if version != 4 {
            debug!("ipv4: bad version {}", version);
            return;
        }

        let ihl = ((data[0] & 0x0F) as usize) * 4;
        if ihl != IPV4_HEADER_LEN {
            debug!("ipv4: unsupported IHL {}", ihl);
            return;
        }

        let total_len = u16::from_be_bytes([data[2], data[3]]) as usize;
        if total_len < IPV4_HEADER_LEN || total_len > data.len() {
            debug!("ipv4: bad total length {} (buffer {})", total_len, data.len());
            return;
        }

        let stored_checksum = u16::from_be_bytes([data[10], data[11]]);
        let proto = data[9];
        let src_ip = Ipv4Addr([data[12], data[13], data[14], data[15]]);
        let dst_ip = Ipv4Addr([data[16], data[17], data[18], data[19]]);

        (proto, src_ip, dst_ip, stored_checksum, total_len)
    };

    // The L4 offset doubles as the end of the L3 header, so record it before
    // checksum computation.  It stays valid after the header is pulled, which
    // is what lets ICMP quote the original header bytes.
    pkt.set_l3(pkt.head());
    pkt.set_l4(pkt.head() + IPV4_HEADER_LEN);

    let checksum_rx = stack.driver.features().contains(LinkFeatures::CHECKSUM_RX);
    if !checksum_rx && pkt.compute_ipv4_checksum() != stored_checksum {
        debug!("ipv4: bad header checksum from {}", src_ip);
        return;
    }

    if dst_ip != stack.config.ip {
        return;
    }

    if pkt.len() > total_len && pkt.trim_tail(pkt.len() - total_len).is_err() {
        return;
    }

    // Dispatch purely on handler presence; anything unregistered is
    // protocol-unreachable.  The header stays in place on that path so the
    // ICMP error can quote it.
    match stack.protocols.remove(&proto) {
        Some(mut handler) => {
            if pkt.pull_header(IPV4_HEADER_LEN).is_ok() {
                handler(stack, pkt, src_ip);
            }
            stack.protocols.entry(proto).or_insert(handler);
        }
        None => {
            debug!("ipv4: no handler for protocol {}, sending unreachable", proto);
            icmp::send_unreachable(stack, &pkt, src_ip, ICMP_CODE_PROTOCOL_UNREACH);
        }
    }
}

// =============================================================================
// Egress
// =============================================================================

/// Prepend an IPv4 header onto one fragment (or whole datagram) and hand it
/// to ARP resolution.
///
/// `offset_units` is the fragment offset in 8-byte units; `more` sets the
/// MF bit.
pub fn send_fragment(
    stack: &mut NetStack,
    mut pkt: PacketBuf,
    dst_ip: Ipv4Addr,
    protocol: IpProtocol,
    ident: u16,
    offset_units: u16,
    more: bool,
) -> Result<(), NetError> {
    let total_len = (pkt.len() + IPV4_HEADER_LEN) as u16;
    let our_ip = stack.config.ip;

    let mut frag_word = offset_units & FRAG_OFFSET_MASK;
    if more {
        frag_word |= IpFlags::MORE_FRAGMENTS.bits();
    }

    let hdr = pkt.push_header(IPV4_HEADER_LEN)?;
    hdr[0] = 0x45; // version 4, IHL 5
    hdr[1] = 0; // ToS
    hdr[2..4].copy_from_slice(&total_len.to_be_bytes());
    hdr[4..6].copy_from_slice(&ident.to_be_bytes());
    hdr[6..8].copy_from_slice(&frag_word.to_be_bytes());
    hdr[8] = IP_DEFAULT_TTL;
    hdr[9] = protocol.as_u8();
    hdr[10..12].copy_from_slice(&0u16.to_be_bytes());
    hdr[12..16].copy_from_slice(&our_ip.0);
    hdr[16..20].copy_from_slice(&dst_ip.0);

    pkt.set_l3(pkt.head());
    pkt.set_l4(pkt.head() + IPV4_HEADER_LEN);
    let checksum = pkt.compute_ipv4_checksum();
    pkt.payload_mut()[10..12].copy_from_slice(&checksum.to_be_bytes());

    arp::resolve_out(stack, pkt, dst_ip)
}

/// Send an IPv4 datagram, fragmenting when the payload exceeds the MTU.
///
/// Fragment payloads are contiguous slices of the original, each in its own
/// buffer, emitted in ascending offset order.  All fragments of one datagram
/// share an identification value; the counter advances once per datagram.
pub fn send(
    stack: &mut NetStack,
    pkt: PacketBuf,
    dst_ip: Ipv4Addr,
    protocol: IpProtocol,
) -> Result<(), NetError> {
    let ident = stack.ip_ident;
    stack.ip_ident = stack.ip_ident.wrapping_add(1);

    if pkt.len() <= MAX_FRAGMENT_PAYLOAD {
        return send_fragment(stack, pkt, dst_ip, protocol, ident, 0, false);
    }

    // Largest multiple of 8 that fits: 1480 for the standard MTU.
    let chunk = (MAX_FRAGMENT_PAYLOAD / 8) * 8;
    let payload = pkt.payload();
    let fragment_count = payload.len().div_ceil(chunk);

    for (i, piece) in payload.chunks(chunk).enumerate() {
        let mut frag = PacketBuf::alloc();
        frag.append(piece);

        let more = i + 1 < fragment_count;
        let offset_units = ((i * chunk) / 8) as u16;
        send_fragment(stack, frag, dst_ip, protocol, ident, offset_units, more)?;
    }
    Ok(())
}
