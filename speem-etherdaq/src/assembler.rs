//! Frame windows over the batch queue.

use crate::BatchQueue;
use log::trace;
use speem_core::settings::clamp_frame_time;
use speem_core::RawFrame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Collects every batch queued during a frame window into one raw frame.
///
/// The queue is drained with a single swap at the end of the window, so a
/// batch lands in exactly one frame: the first read that drains after it was
/// pushed. Nothing is dropped between windows unless
/// [`discard_buffered`](Self::discard_buffered) is called.
#[derive(Debug)]
pub struct FrameAssembler {
    queue: Arc<BatchQueue>,
    frame_time: AtomicU64,
}

impl FrameAssembler {
    /// Creates an assembler over `queue` with a window of `frame_time`
    /// seconds, clamped to the allowed range.
    #[must_use]
    pub fn new(queue: Arc<BatchQueue>, frame_time: f64) -> Self {
        Self {
            queue,
            frame_time: AtomicU64::new(clamp_frame_time(frame_time).to_bits()),
        }
    }

    /// Current frame window in seconds.
    #[must_use]
    pub fn frame_time(&self) -> f64 {
        f64::from_bits(self.frame_time.load(Ordering::Acquire))
    }

    /// Change the frame window; returns the value actually applied.
    pub fn set_frame_time(&self, seconds: f64) -> f64 {
        let clamped = clamp_frame_time(seconds);
        self.frame_time.store(clamped.to_bits(), Ordering::Release);
        clamped
    }

    /// Wait `window` without blocking the runtime, then drain the queue.
    ///
    /// Batches queued before the call are included unless they were
    /// discarded. An empty window yields an empty frame.
    pub async fn read_frame(&self, window: Duration) -> RawFrame {
        tokio::time::sleep(window).await;
        self.drain_frame()
    }

    /// [`read_frame`](Self::read_frame) using the frame time current at the
    /// moment of the call.
    pub async fn read_next_frame(&self) -> RawFrame {
        let window = Duration::from_secs_f64(self.frame_time());
        self.read_frame(window).await
    }

    /// Drain whatever is queued into a frame without waiting.
    #[must_use]
    pub fn drain_frame(&self) -> RawFrame {
        let batches = self.queue.drain();
        let frame = RawFrame::from_batches(&batches);
        trace!("drained {} batches, {} hits", batches.len(), frame.len());
        frame
    }

    /// Drop every queued batch; returns how many were dropped.
    pub fn discard_buffered(&self) -> usize {
        self.queue.discard_all()
    }

    /// The queue this assembler drains.
    #[must_use]
    pub fn queue(&self) -> &Arc<BatchQueue> {
        &self.queue
    }
}
