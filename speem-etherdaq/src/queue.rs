//! FIFO of decoded hit batches between the capture thread and frame reads.

use log::warn;
use speem_core::HitBatch;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Bounded queue of hit batches.
///
/// The lock is only held to push one batch or to swap the whole queue out,
/// so a frame read never stalls the capture thread for longer than a
/// pointer swap. A push into a full queue loses that batch and counts it;
/// it never fails the producer.
#[derive(Debug)]
pub struct BatchQueue {
    batches: Mutex<VecDeque<HitBatch>>,
    capacity: usize,
    lost: AtomicU64,
}

impl BatchQueue {
    /// Creates a queue holding at most `capacity` batches.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            batches: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            lost: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<HitBatch>> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a batch. Returns `false` if the queue was full and the batch
    /// was lost.
    pub fn push(&self, batch: HitBatch) -> bool {
        let mut batches = self.lock();
        if batches.len() >= self.capacity {
            drop(batches);
            let lost = self.lost.fetch_add(1, Ordering::Relaxed) + 1;
            if lost == 1 || lost % 1000 == 0 {
                warn!(
                    "batch queue full ({} batches), {lost} batch(es) lost so far",
                    self.capacity
                );
            }
            return false;
        }
        batches.push_back(batch);
        true
    }

    /// Take every queued batch, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<HitBatch> {
        let taken = std::mem::take(&mut *self.lock());
        Vec::from(taken)
    }

    /// Replace the queue with an empty one, returning how many batches were
    /// discarded. Batches pushed after this call are kept.
    pub fn discard_all(&self) -> usize {
        std::mem::take(&mut *self.lock()).len()
    }

    /// Number of queued batches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Maximum number of queued batches.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Batches lost to a full queue since creation.
    #[must_use]
    pub fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }
}

impl Default for BatchQueue {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speem_core::RawHit;
    use std::sync::Arc;
    use std::thread;

    fn batch(id: u16) -> HitBatch {
        HitBatch::new(id, vec![RawHit::new(id, id, id)])
    }

    #[test]
    fn test_fifo_order() {
        let queue = BatchQueue::new(8);
        for id in 0..3 {
            assert!(queue.push(batch(id)));
        }
        let ids: Vec<_> = queue.drain().iter().map(|b| b.packet_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overflow_counts_lost() {
        let queue = BatchQueue::new(2);
        assert!(queue.push(batch(0)));
        assert!(queue.push(batch(1)));
        assert!(!queue.push(batch(2)));
        assert_eq!(queue.lost(), 1);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_discard_keeps_later_pushes() {
        let queue = BatchQueue::new(8);
        queue.push(batch(0));
        queue.push(batch(1));
        assert_eq!(queue.discard_all(), 2);
        queue.push(batch(2));
        let ids: Vec<_> = queue.drain().iter().map(|b| b.packet_id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_concurrent_push_and_drain_lose_nothing() {
        let queue = Arc::new(BatchQueue::new(100_000));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for id in 0..10_000u16 {
                    queue.push(batch(id));
                }
            })
        };

        let mut seen = Vec::new();
        while !producer.is_finished() {
            seen.extend(queue.drain().into_iter().map(|b| b.packet_id));
        }
        producer.join().unwrap();
        seen.extend(queue.drain().into_iter().map(|b| b.packet_id));

        assert_eq!(seen, (0..10_000u16).collect::<Vec<_>>());
        assert_eq!(queue.lost(), 0);
    }
}
