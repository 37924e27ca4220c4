//! Ethernet framing for the transmit path.

use log::debug;

use crate::netstack::NetStack;
use crate::packetbuf::PacketBuf;
use crate::types::{EtherType, MacAddr, NetError};
use crate::{ETH_ADDR_LEN, ETH_HEADER_LEN};

/// Prepend an Ethernet header and hand the frame to the link driver.
///
/// The source MAC is the interface identity.  Counts the frame in the TX
/// stats on success.
pub fn transmit(
    stack: &mut NetStack,
    mut pkt: PacketBuf,
    dst_mac: MacAddr,
    ethertype: EtherType,
) -> Result<(), NetError> {
    let src_mac = stack.config.mac;

    let eth = pkt.push_header(ETH_HEADER_LEN)?;
    eth[0..ETH_ADDR_LEN].copy_from_slice(&dst_mac.0);
    eth[ETH_ADDR_LEN..ETH_ADDR_LEN * 2].copy_from_slice(&src_mac.0);
    eth[ETH_ADDR_LEN * 2..ETH_HEADER_LEN].copy_from_slice(&ethertype.as_u16().to_be_bytes());

    match stack.driver.tx(pkt) {
        Ok(()) => {
            stack.stats.tx_frames += 1;
            Ok(())
        }
        Err(e) => {
            debug!("ethernet: tx to {} failed: {}", dst_mac, e);
            stack.stats.tx_dropped += 1;
            Err(e)
        }
    }
}
