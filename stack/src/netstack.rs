//! The stack object: interface identity, caches, registries, and driver.
//!
//! One [`NetStack`] owns everything the protocol layers share: the ARP
//! resolution cache, the pending-send queue, the UDP port table, the upper
//! protocol registry, the IP identification counter, and the link driver.
//! Protocol code is free functions threaded through `&mut NetStack`, so the
//! single-threaded cooperative model is enforced by the borrow checker
//! rather than by convention.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use core::fmt;

use log::info;

use crate::arp::{ARP_CACHE_CAPACITY, ARP_CACHE_TTL_SECS, ARP_PENDING_CAPACITY, ARP_PENDING_TTL_SECS};
use crate::clock::TimeSource;
use crate::ingress;
use crate::netdev::LinkDriver;
use crate::packetbuf::PacketBuf;
use crate::ttlmap::TtlMap;
use crate::types::{IpProtocol, Ipv4Addr, MacAddr, NetError, Port};
use crate::udp::{UdpHandler, UdpPortTable};
use crate::{arp, icmp, udp};

// =============================================================================
// IfaceConfig
// =============================================================================

/// Interface identity: our IPv4 address and MAC.  Read-only after init.
#[derive(Clone, Copy)]
pub struct IfaceConfig {
    /// IPv4 address assigned to this interface.
    pub ip: Ipv4Addr,
    /// Hardware address of this interface.
    pub mac: MacAddr,
}

impl fmt::Debug for IfaceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IfaceConfig {{ ip={}, mac={} }}", self.ip, self.mac)
    }
}

// =============================================================================
// StackStats
// =============================================================================

/// Counters kept by the stack.  Monotonically increasing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StackStats {
    /// Frames accepted by the ingress MAC filter.
    pub rx_frames: u64,
    /// Frames handed to the link driver.
    pub tx_frames: u64,
    /// Frames dropped before protocol dispatch (short, unknown EtherType).
    pub rx_dropped: u64,
    /// Outbound datagrams dropped (pending collision, driver queue full).
    pub tx_dropped: u64,
}

// =============================================================================
// NetStack
// =============================================================================

/// Handler for one upper-layer IP protocol, keyed by protocol number.
///
/// UDP and ICMP register themselves at construction; additional protocols
/// can be hooked in through [`NetStack::add_protocol`].
pub type ProtocolHandler = Box<dyn FnMut(&mut NetStack, PacketBuf, Ipv4Addr)>;

/// A single-interface ARP/IPv4/UDP stack over an Ethernet-like link.
pub struct NetStack {
    pub(crate) config: IfaceConfig,
    pub(crate) driver: Box<dyn LinkDriver>,
    pub(crate) clock: Box<dyn TimeSource>,
    /// Peer IPv4 to peer MAC, refreshed by every valid ARP frame.
    pub(crate) arp_cache: TtlMap<Ipv4Addr, MacAddr>,
    /// One queued outbound datagram per unresolved destination.
    pub(crate) arp_pending: TtlMap<Ipv4Addr, PacketBuf>,
    pub(crate) udp_ports: UdpPortTable,
    pub(crate) protocols: BTreeMap<u8, ProtocolHandler>,
    /// IPv4 identification counter; advances once per datagram.
    pub(crate) ip_ident: u16,
    pub(crate) stats: StackStats,
}

impl NetStack {
    /// Bring up a stack on the given link.
    ///
    /// Creates the caches, registers the built-in UDP and ICMP handlers, and
    /// announces our binding with a gratuitous ARP request.
    pub fn new(config: IfaceConfig, driver: Box<dyn LinkDriver>, clock: Box<dyn TimeSource>) -> Self {
        let mut stack = Self {
            config,
            driver,
            clock,
            arp_cache: TtlMap::new(ARP_CACHE_TTL_SECS, ARP_CACHE_CAPACITY),
            arp_pending: TtlMap::new(ARP_PENDING_TTL_SECS, ARP_PENDING_CAPACITY),
            udp_ports: UdpPortTable::new(),
            protocols: BTreeMap::new(),
            ip_ident: 0,
            stats: StackStats::default(),
        };

        stack.protocols.insert(
            IpProtocol::Udp.as_u8(),
            Box::new(|stack, pkt, src_ip| udp::handle_rx(stack, pkt, src_ip)),
        );
        stack.protocols.insert(
            IpProtocol::Icmp.as_u8(),
            Box::new(|stack, pkt, src_ip| icmp::handle_rx(stack, pkt, src_ip)),
        );

        info!("netstack: up as {} ({})", stack.config.ip, stack.config.mac);
        arp::announce(&mut stack);
        stack
    }

    /// Feed one received frame through the ingress pipeline.
    ///
    /// The frame is consumed within the call chain; handlers copy what they
    /// need to keep.
    pub fn handle_frame(&mut self, frame: &[u8]) {
        let pkt = PacketBuf::from_frame(frame);
        ingress::net_rx(self, pkt);
    }

    /// Housekeeping tick: sweep expired cache entries.
    ///
    /// Expiry is also applied lazily at every lookup; `poll` merely keeps the
    /// maps from accumulating dead entries between lookups.
    pub fn poll(&mut self) {
        let now = self.clock.now_secs();
        self.arp_cache.purge(now);
        self.arp_pending.purge(now);
    }

    // =========================================================================
    // Protocol and port registration
    // =========================================================================

    /// Register a handler for an upper-layer IP protocol number.
    ///
    /// Replaces any existing handler for that protocol.
    pub fn add_protocol(&mut self, protocol: u8, handler: ProtocolHandler) {
        self.protocols.insert(protocol, handler);
    }

    /// Bind a handler to a local UDP port.  A port already bound is an error.
    pub fn udp_bind(&mut self, port: Port, handler: UdpHandler) -> Result<(), NetError> {
        self.udp_ports.bind(port, handler)
    }

    /// Remove the handler bound to a local UDP port.
    pub fn udp_unbind(&mut self, port: Port) {
        self.udp_ports.unbind(port);
    }

    /// Send a UDP datagram carrying `payload` from `src_port` to
    /// `dst_ip:dst_port`.
    ///
    /// The payload is copied into a freshly owned buffer, so queuing for ARP
    /// resolution or fragmentation never aliases caller memory.
    pub fn udp_sendto(
        &mut self,
        payload: &[u8],
        src_port: Port,
        dst_ip: Ipv4Addr,
        dst_port: Port,
    ) -> Result<(), NetError> {
        let mut pkt = PacketBuf::alloc();
        pkt.append(payload);
        udp::send(self, pkt, src_port, dst_ip, dst_port)
    }

    // =========================================================================
    // Accessors and diagnostics
    // =========================================================================

    /// The interface identity.
    pub fn config(&self) -> &IfaceConfig {
        &self.config
    }

    /// Snapshot of the stack counters.
    pub fn stats(&self) -> StackStats {
        self.stats
    }

    /// Look up a peer's MAC in the resolution cache.
    pub fn lookup_arp(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.arp_cache.get(&ip, self.clock.now_secs()).copied()
    }

    /// Number of fresh entries in the resolution cache.
    pub fn arp_cache_len(&self) -> usize {
        self.arp_cache.len(self.clock.now_secs())
    }

    /// Log every fresh resolution cache entry.
    pub fn dump_arp_cache(&self) {
        let now = self.clock.now_secs();
        for (ip, mac) in self.arp_cache.iter(now) {
            info!("arp: {} -> {}", ip, mac);
        }
    }
}
