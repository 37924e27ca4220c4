//! Time injection for cache aging.
//!
//! The stack never reads a wall clock directly; it asks its [`TimeSource`]
//! whenever it stamps or checks a cache entry.  Harnesses plug in a real
//! clock, tests drive a manual one.

/// A monotonic seconds counter.
///
/// Only coarse (whole-second) resolution is needed: the shortest TTL in the
/// stack is the one-second ARP re-request interval.
pub trait TimeSource {
    /// Seconds elapsed since an arbitrary fixed origin.
    fn now_secs(&self) -> u64;
}

/// [`TimeSource`] backed by `std::time::Instant`.
///
/// The origin is the moment the clock was created.
#[cfg(any(test, feature = "std"))]
pub struct SystemClock {
    origin: std::time::Instant,
}

#[cfg(any(test, feature = "std"))]
impl SystemClock {
    /// Create a clock whose origin is "now".
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(any(test, feature = "std"))]
impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "std"))]
impl TimeSource for SystemClock {
    fn now_secs(&self) -> u64 {
        self.origin.elapsed().as_secs()
    }
}
