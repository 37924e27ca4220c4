//! Link driver boundary: the `LinkDriver` trait and a queue-backed driver.
//!
//! This module establishes the boundary between the link driver (which moves
//! frames) and the protocol stack (which understands protocols).  Only
//! [`PacketBuf`] crosses this boundary: the stack hands the driver fully
//! framed Ethernet packets, and the driver pump feeds received frames back
//! through [`NetStack::handle_frame`](crate::netstack::NetStack::handle_frame).

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use core::cell::RefCell;

use bitflags::bitflags;

use crate::packetbuf::PacketBuf;
use crate::types::NetError;

bitflags! {
    /// Capability flags advertised by a link driver.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct LinkFeatures: u8 {
        /// The device verifies IPv4 header checksums on receive; the stack
        /// skips its own verification.
        const CHECKSUM_RX = 1 << 0;
    }
}

/// Abstraction over the transmitting side of an Ethernet-like link.
///
/// Implementations own their queueing and I/O; the stack calls `tx` with a
/// complete frame (Ethernet header already prepended) and moves on.
pub trait LinkDriver {
    /// Transmit one frame.  The frame is consumed.
    ///
    /// Returns `Err(NoBufferSpace)` if the transmit queue is full.
    fn tx(&mut self, frame: PacketBuf) -> Result<(), NetError>;

    /// Capability flags.  Defaults to none.
    fn features(&self) -> LinkFeatures {
        LinkFeatures::empty()
    }
}

// =============================================================================
// QueueDriver
// =============================================================================

/// Maximum number of frames held by a [`QueueDriver`] by default.
const QUEUE_DRIVER_CAPACITY: usize = 256;

struct QueueInner {
    queue: VecDeque<PacketBuf>,
    capacity: usize,
}

/// A driver that parks transmitted frames in an internal queue.
///
/// Cloning yields another handle onto the same queue, so a harness can hand
/// one handle to the stack and drain frames through the other.  This is the
/// loopback-style device used by the scenario tests.
#[derive(Clone)]
pub struct QueueDriver {
    inner: Rc<RefCell<QueueInner>>,
}

impl QueueDriver {
    /// Create an empty queue driver with the default capacity.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(QueueInner {
                queue: VecDeque::new(),
                capacity: QUEUE_DRIVER_CAPACITY,
            })),
        }
    }

    /// Pop the oldest transmitted frame, if any.
    pub fn pop(&self) -> Option<PacketBuf> {
        self.inner.borrow_mut().queue.pop_front()
    }

    /// Number of frames currently queued.
    pub fn len(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// `true` if no frames are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for QueueDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkDriver for QueueDriver {
    fn tx(&mut self, frame: PacketBuf) -> Result<(), NetError> {
        let mut inner = self.inner.borrow_mut();
        if inner.queue.len() >= inner.capacity {
            return Err(NetError::NoBufferSpace);
        }
        inner.queue.push_back(frame);
        Ok(())
    }
}
