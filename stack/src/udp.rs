//! UDP - per-port handler registry, inbound demux, and outbound framing.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use log::debug;

use crate::icmp;
use crate::ipv4;
use crate::netstack::NetStack;
use crate::packetbuf::PacketBuf;
use crate::types::{IpProtocol, Ipv4Addr, NetError, Port};
use crate::{ICMP_CODE_PORT_UNREACH, UDP_HEADER_LEN};

/// Callback invoked with the payload of a datagram delivered to a bound port.
///
/// Receives the stack itself so the handler can send (echo servers, request
/// responders) without captured aliases.
pub type UdpHandler = Box<dyn FnMut(&mut NetStack, &[u8], Ipv4Addr, Port)>;

// =============================================================================
// Port table
// =============================================================================

/// Registry mapping local UDP ports to handlers.  At most one handler per
/// port; no expiration.
pub struct UdpPortTable {
    entries: BTreeMap<Port, UdpHandler>,
}

impl UdpPortTable {
    /// Create an empty table.
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Bind a handler to `port`.  A port already bound is an error.
    pub fn bind(&mut self, port: Port, handler: UdpHandler) -> Result<(), NetError> {
        if self.entries.contains_key(&port) {
            return Err(NetError::AddressInUse);
        }
        self.entries.insert(port, handler);
        Ok(())
    }

    /// Remove the handler bound to `port`, if any.
    pub fn unbind(&mut self, port: Port) {
        self.entries.remove(&port);
    }

    /// `true` if a handler is bound to `port`.
    pub fn is_bound(&self, port: Port) -> bool {
        self.entries.contains_key(&port)
    }

    /// Take the handler out of the table for the duration of a dispatch.
    pub(crate) fn take(&mut self, port: Port) -> Option<UdpHandler> {
        self.entries.remove(&port)
    }

    /// Put a dispatched handler back, unless the handler rebound the port
    /// meanwhile (the newer binding wins).
    pub(crate) fn restore(&mut self, port: Port, handler: UdpHandler) {
        self.entries.entry(port).or_insert(handler);
    }
}

impl Default for UdpPortTable {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Ingress
// =============================================================================

/// Handle an incoming UDP datagram.
///
/// The packet's head points at the UDP header (IP header pulled by the IPv4
/// layer, but still reachable through the L3 offset).  Datagrams with short
/// or over-declared lengths, or a failing pseudo-header checksum, are
/// silently dropped.  A datagram for an unbound port earns the sender an
/// ICMP port-unreachable quoting the retained IP header.
pub fn handle_rx(stack: &mut NetStack, mut pkt: PacketBuf, src_ip: Ipv4Addr) {
    let (src_port, dst_port, stored_checksum) = {
        let data = pkt.payload();
        if data.len() < UDP_HEADER_LEN {
            debug!("udp: datagram too short ({} < {})", data.len(), UDP_HEADER_LEN);
            return;
        }
        let declared_len = u16::from_be_bytes([data[4], data[5]]) as usize;
        if declared_len < UDP_HEADER_LEN || declared_len > data.len() {
            debug!("udp: bad length {} (buffer {})", declared_len, data.len());
            return;
        }

        let src_port = Port::from_network_bytes([data[0], data[1]]);
        let dst_port = Port::from_network_bytes([data[2], data[3]]);
        let stored_checksum = u16::from_be_bytes([data[6], data[7]]);
        (src_port, dst_port, stored_checksum)
    };

    if pkt.compute_udp_checksum(src_ip, stack.config.ip) != stored_checksum {
        debug!("udp: bad checksum from {}:{}", src_ip, src_port);
        return;
    }

    match stack.udp_ports.take(dst_port) {
        Some(mut handler) => {
            if pkt.pull_header(UDP_HEADER_LEN).is_ok() {
                handler(stack, pkt.payload(), src_ip, src_port);
            }
            stack.udp_ports.restore(dst_port, handler);
        }
        None => {
            debug!("udp: no handler on port {}, sending unreachable", dst_port);
            icmp::send_unreachable(stack, &pkt, src_ip, ICMP_CODE_PORT_UNREACH);
        }
    }
}

// =============================================================================
// Egress
// =============================================================================

/// Prepend a UDP header, fill in the pseudo-header checksum, and hand the
/// datagram to the IPv4 layer.
pub fn send(
    stack: &mut NetStack,
    mut pkt: PacketBuf,
    src_port: Port,
    dst_ip: Ipv4Addr,
    dst_port: Port,
) -> Result<(), NetError> {
    let udp_len = (pkt.len() + UDP_HEADER_LEN) as u16;

    let hdr = pkt.push_header(UDP_HEADER_LEN)?;
    hdr[0..2].copy_from_slice(&src_port.to_network_bytes());
    hdr[2..4].copy_from_slice(&dst_port.to_network_bytes());
    hdr[4..6].copy_from_slice(&udp_len.to_be_bytes());
    hdr[6..8].copy_from_slice(&0u16.to_be_bytes());

    pkt.set_l4(pkt.head());
    let checksum = pkt.compute_udp_checksum(stack.config.ip, dst_ip);
    pkt.payload_mut()[6..8].copy_from_slice(&checksum.to_be_bytes());

    ipv4::send(stack, pkt, dst_ip, IpProtocol::Udp)
}
