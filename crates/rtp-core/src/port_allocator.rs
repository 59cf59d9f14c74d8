//! Even/odd RTP/RTCP port-pair allocator.
//!
//! Grounded 1:1 on `original_source/helper/sip_session.py::RTPPortAllocator`:
//! a stride-4 scan over `[start, end)` handing out `(p, p+2)` pairs, no
//! wraparound once `next_port` runs past `end`.

use crate::error::{Result, RtpError};
use std::collections::HashSet;

/// Hands out non-overlapping `(rtp_port, rtcp_port)` pairs from a fixed
/// range (spec.md §4.6).
pub struct PortAllocator {
    start: u16,
    end: u16,
    next_port: u32,
    allocated: HashSet<u16>,
}

impl PortAllocator {
    pub fn new(start: u16, end: u16) -> Self {
        PortAllocator {
            start,
            end,
            next_port: start as u32,
            allocated: HashSet::new(),
        }
    }

    /// Allocate the next free even/odd pair. Fails with `NoPorts` once the
    /// scan reaches `end` without finding a free even port; the original
    /// does not wrap back to `start`.
    pub fn allocate(&mut self) -> Result<(u16, u16)> {
        while (self.next_port as u32) < self.end as u32 {
            let port = self.next_port as u16;
            self.next_port += 4;
            if port % 2 != 0 {
                continue;
            }
            let rtcp = port + 2;
            if rtcp >= self.end {
                continue;
            }
            if self.allocated.contains(&port) || self.allocated.contains(&rtcp) {
                continue;
            }
            self.allocated.insert(port);
            self.allocated.insert(rtcp);
            return Ok((port, rtcp));
        }
        Err(RtpError::NoPorts)
    }

    /// Release a previously allocated pair so it may be handed out again.
    ///
    /// Note: the original scan never rewinds `next_port`, so released ports
    /// below the current scan position are only reused once `next_port`
    /// wraps via a fresh allocator; this matches the non-wrapping behaviour
    /// documented in spec.md §4.6.
    pub fn release(&mut self, rtp_port: u16, rtcp_port: u16) {
        self.allocated.remove(&rtp_port);
        self.allocated.remove(&rtcp_port);
    }

    pub fn is_allocated(&self, port: u16) -> bool {
        self.allocated.contains(&port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_even_odd_pairs_with_stride_four() {
        let mut pool = PortAllocator::new(10000, 10020);
        let (a, a_rtcp) = pool.allocate().unwrap();
        let (b, b_rtcp) = pool.allocate().unwrap();
        assert_eq!(a, 10000);
        assert_eq!(a_rtcp, 10002);
        assert_eq!(b, 10004);
        assert_eq!(b_rtcp, 10006);
    }

    #[test]
    fn never_hands_out_the_same_pair_twice() {
        let mut pool = PortAllocator::new(10000, 10020);
        let mut seen = HashSet::new();
        loop {
            match pool.allocate() {
                Ok((p, _)) => assert!(seen.insert(p), "duplicate port {p}"),
                Err(RtpError::NoPorts) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
    }

    #[test]
    fn exhaustion_fails_with_no_ports() {
        let mut pool = PortAllocator::new(10000, 10004);
        pool.allocate().unwrap();
        assert!(matches!(pool.allocate(), Err(RtpError::NoPorts)));
    }

    #[test]
    fn released_ports_are_no_longer_marked_allocated() {
        let mut pool = PortAllocator::new(10000, 10020);
        let (p, rtcp) = pool.allocate().unwrap();
        pool.release(p, rtcp);
        assert!(!pool.is_allocated(p));
    }
}
