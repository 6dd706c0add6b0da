//! Raw detector hits and per-packet hit batches.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A single detected particle in raw detector bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RawHit {
    /// X position bin.
    pub x: u16,
    /// Y position bin.
    pub y: u16,
    /// Time-of-flight bin.
    pub t: u16,
}

impl RawHit {
    /// Creates a new raw hit.
    #[inline]
    #[must_use]
    pub fn new(x: u16, y: u16, t: u16) -> Self {
        Self { x, y, t }
    }

    /// Returns the hit as an `[x, y, t]` row.
    #[inline]
    #[must_use]
    pub fn as_row(&self) -> [u16; 3] {
        [self.x, self.y, self.t]
    }
}

impl From<(u16, u16, u16)> for RawHit {
    fn from((x, y, t): (u16, u16, u16)) -> Self {
        Self { x, y, t }
    }
}

/// Hits decoded from one inbound datagram.
///
/// Hit order within the batch is the order the events appeared in the packet.
#[derive(Debug, Clone, PartialEq)]
pub struct HitBatch {
    /// Sequence id reported in the packet header.
    pub packet_id: u16,
    /// Time the datagram was received.
    pub received_at: Instant,
    /// Accepted hits, in packet order.
    pub hits: Vec<RawHit>,
}

impl HitBatch {
    /// Creates a batch stamped with the current time.
    #[must_use]
    pub fn new(packet_id: u16, hits: Vec<RawHit>) -> Self {
        Self::received(packet_id, hits, Instant::now())
    }

    /// Creates a batch with an explicit arrival time.
    #[must_use]
    pub fn received(packet_id: u16, hits: Vec<RawHit>, received_at: Instant) -> Self {
        Self {
            packet_id,
            received_at,
            hits,
        }
    }

    /// Returns the number of hits in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Returns true if the batch holds no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_hit_row() {
        let hit = RawHit::new(1, 2, 3);
        assert_eq!(hit.as_row(), [1, 2, 3]);
        assert_eq!(RawHit::from((1, 2, 3)), hit);
    }

    #[test]
    fn test_hit_batch_len() {
        let batch = HitBatch::new(7, vec![RawHit::new(0, 0, 0), RawHit::new(1, 1, 1)]);
        assert_eq!(batch.packet_id, 7);
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
        assert!(HitBatch::new(0, Vec::new()).is_empty());
    }
}
