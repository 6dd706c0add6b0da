//! Detector driver: source, frame windows and unit conversion in one handle.

use crate::assembler::FrameAssembler;
use crate::packet::DecodeCounts;
use crate::source::HitSource;
use crate::Result;
use log::{debug, info};
use speem_core::{CalibrationModel, CoordinateConverter, DetectorSettings, Frame, RawFrame};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Frames kept for slow subscribers before they start lagging.
const FRAME_CHANNEL_CAPACITY: usize = 16;

/// Owns a packet source and turns its output into converted frames.
///
/// Converted frames are returned to the caller and published to every
/// [`subscribe`](Self::subscribe)r. Time-bin edges are published through
/// [`subscribe_time_edges`](Self::subscribe_time_edges) whenever the timing
/// delay changes.
pub struct EtherDaqDriver {
    source: Box<dyn HitSource>,
    assembler: FrameAssembler,
    converter: CoordinateConverter,
    frames: broadcast::Sender<Arc<Frame>>,
    time_edges: watch::Sender<Vec<f64>>,
    queue_stale: bool,
}

impl EtherDaqDriver {
    /// Wraps `source`; nothing runs until [`start`](Self::start).
    #[must_use]
    pub fn new(
        source: Box<dyn HitSource>,
        settings: &DetectorSettings,
        calibration: CalibrationModel,
    ) -> Self {
        let assembler = FrameAssembler::new(Arc::clone(source.queue()), settings.frame_time);
        let converter = CoordinateConverter::new(settings, calibration);
        let (frames, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        let (time_edges, _) = watch::channel(converter.t_bins().to_vec());
        Self {
            source,
            assembler,
            converter,
            frames,
            time_edges,
            queue_stale: false,
        }
    }

    /// Start the packet source.
    ///
    /// # Errors
    /// Returns an error if the source is already running or cannot open.
    pub fn start(&mut self) -> Result<()> {
        self.source.start()?;
        info!(
            "detector running, frame time {} s, time axis {:?} ns",
            self.frame_time(),
            self.converter.time_range()
        );
        Ok(())
    }

    /// Stop the packet source. Safe to call more than once.
    ///
    /// # Errors
    /// Returns an error if the source thread panicked.
    pub fn shutdown(&mut self) -> Result<()> {
        self.source.stop()?;
        let counts = self.decode_stats();
        info!(
            "detector stopped: {} packets, {} events, {} dropped, {} swapped, {} batches lost",
            counts.packets,
            counts.events,
            counts.dropped_events,
            counts.swapped_events,
            self.lost_batches()
        );
        Ok(())
    }

    /// Returns true while the source is producing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.source.is_running()
    }

    /// Wait one frame time, then convert and publish everything queued.
    pub async fn read_frame(&self) -> Arc<Frame> {
        let raw = self.assembler.read_next_frame().await;
        self.publish(&raw)
    }

    /// Drain the queue immediately, without waiting or converting.
    #[must_use]
    pub fn read_raw_frame(&self) -> RawFrame {
        self.assembler.drain_frame()
    }

    /// One step of the live acquisition loop.
    ///
    /// While `paused`, waits one frame time and returns `None`; incoming
    /// batches keep queueing and are marked stale. The first step after a
    /// pause discards them so the returned frame covers a fresh window.
    pub async fn run_step(&mut self, paused: bool) -> Option<Arc<Frame>> {
        if paused {
            self.queue_stale = true;
            tokio::time::sleep(Duration::from_secs_f64(self.frame_time())).await;
            return None;
        }
        if self.queue_stale {
            let discarded = self.assembler.discard_buffered();
            debug!("resumed, discarded {discarded} stale batches");
            self.queue_stale = false;
        }
        Some(self.read_frame().await)
    }

    fn publish(&self, raw: &RawFrame) -> Arc<Frame> {
        let frame = Arc::new(self.converter.convert(raw));
        // No subscribers is not an error.
        let _ = self.frames.send(Arc::clone(&frame));
        frame
    }

    /// Receive every converted frame produced from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Frame>> {
        self.frames.subscribe()
    }

    /// Watch the time-bin edges. The current edges are marked seen.
    #[must_use]
    pub fn subscribe_time_edges(&self) -> watch::Receiver<Vec<f64>> {
        self.time_edges.subscribe()
    }

    /// Current frame time in seconds.
    #[must_use]
    pub fn frame_time(&self) -> f64 {
        self.assembler.frame_time()
    }

    /// Change the frame time; returns the clamped value applied.
    pub fn set_frame_time(&self, seconds: f64) -> f64 {
        let applied = self.assembler.set_frame_time(seconds);
        debug!("frame time set to {applied} s");
        applied
    }

    /// Current timing delay in nanoseconds.
    #[must_use]
    pub fn timing_delay(&self) -> f64 {
        self.converter.timing_delay()
    }

    /// Change the timing delay, rebuild the time-bin edges and publish them.
    /// Returns the clamped delay applied.
    pub fn set_timing_delay(&mut self, timing_delay: f64) -> f64 {
        let applied = self.converter.set_timing_delay(timing_delay);
        self.time_edges.send_replace(self.converter.t_bins().to_vec());
        applied
    }

    /// The converter used for every frame.
    #[must_use]
    pub fn converter(&self) -> &CoordinateConverter {
        &self.converter
    }

    /// Batches lost to a full queue.
    #[must_use]
    pub fn lost_batches(&self) -> u64 {
        self.assembler.queue().lost()
    }

    /// Decode counters of the source.
    #[must_use]
    pub fn decode_stats(&self) -> DecodeCounts {
        self.source.decode_stats().snapshot()
    }
}

impl Drop for EtherDaqDriver {
    fn drop(&mut self) {
        let _ = self.source.stop();
    }
}
