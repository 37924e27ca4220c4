//! ICMP - destination-unreachable generation and echo reply.

use log::debug;

use crate::ipv4;
use crate::netstack::NetStack;
use crate::packetbuf::PacketBuf;
use crate::types::{IpProtocol, Ipv4Addr};
use crate::{
    ICMP_HEADER_LEN, ICMP_TYPE_ECHO_REPLY, ICMP_TYPE_ECHO_REQUEST, ICMP_TYPE_UNREACHABLE,
};

/// Bytes of the offending datagram's payload quoted in an unreachable
/// message, after the IP header (RFC 792).
const UNREACH_QUOTE_PAYLOAD: usize = 8;

// =============================================================================
// Errors out
// =============================================================================

/// Send a destination-unreachable message to `dst_ip`.
///
/// `orig` is the offending inbound datagram; its IP header and the first
/// eight payload bytes are quoted through the layer offsets, which remain
/// valid whether or not the header has been pulled.  Failures are silent:
/// an error about an error helps nobody.
pub fn send_unreachable(stack: &mut NetStack, orig: &PacketBuf, dst_ip: Ipv4Addr, code: u8) {
    let ip_header = orig.l3_header();
    if ip_header.is_empty() {
        return;
    }
    let orig_payload = orig.l4_header();
    let quote_len = orig_payload.len().min(UNREACH_QUOTE_PAYLOAD);

    let mut pkt = PacketBuf::alloc();
    let mut header = [0u8; ICMP_HEADER_LEN];
    header[0] = ICMP_TYPE_UNREACHABLE;
    header[1] = code;
    // Bytes 2-3: checksum (below).  Bytes 4-7: unused, must be zero.
    pkt.append(&header);
    pkt.append(ip_header);
    pkt.append(&orig_payload[..quote_len]);

    pkt.set_l4(pkt.head());
    let checksum = pkt.compute_icmp_checksum();
    pkt.payload_mut()[2..4].copy_from_slice(&checksum.to_be_bytes());

    debug!("icmp: unreachable (code {}) to {}", code, dst_ip);
    let _ = ipv4::send(stack, pkt, dst_ip, IpProtocol::Icmp);
}

// =============================================================================
// Ingress
// =============================================================================

/// Handle an incoming ICMP message.
///
/// Echo requests are answered with an echo reply mirroring the identifier,
/// sequence number, and payload.  Everything else is dropped.
pub fn handle_rx(stack: &mut NetStack, pkt: PacketBuf, src_ip: Ipv4Addr) {
    let (msg_type, stored_checksum) = {
        let data = pkt.payload();
        if data.len() < ICMP_HEADER_LEN {
            debug!("icmp: message too short ({} < {})", data.len(), ICMP_HEADER_LEN);
            return;
        }
        (data[0], u16::from_be_bytes([data[2], data[3]]))
    };

    if pkt.compute_icmp_checksum() != stored_checksum {
        debug!("icmp: bad checksum from {}", src_ip);
        return;
    }

    match msg_type {
        ICMP_TYPE_ECHO_REQUEST => {
            let mut reply = PacketBuf::alloc();
            reply.append(pkt.payload());

            let body = reply.payload_mut();
            body[0] = ICMP_TYPE_ECHO_REPLY;
            body[2..4].copy_from_slice(&0u16.to_be_bytes());

            reply.set_l4(reply.head());
            let checksum = reply.compute_icmp_checksum();
            reply.payload_mut()[2..4].copy_from_slice(&checksum.to_be_bytes());

            debug!("icmp: echo reply to {}", src_ip);
            let _ = ipv4::send(stack, reply, src_ip, IpProtocol::Icmp);
        }
        other => {
            debug!("icmp: type {} from {}, dropping", other, src_ip);
        }
    }
}
