//! Rendering-side glue: marginals, count rates and debounced window edits.

use crate::accumulator::{AccumulationMode, MarginalAccumulator};
use crate::debounce::Debouncer;
use crate::histogram::Histogram2D;
use crate::window::Axis;
use crate::Result;
use log::{debug, warn};
use ndarray::Array1;
use speem_core::settings::clamp_averaging_time;
use speem_core::{CoordinateConverter, DetectorSettings, Frame, RateTracker};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};

/// Counts and rates at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorSnapshot {
    /// Events received since the last reset.
    pub total_events: u64,
    /// Events inside all three windows since the last reset.
    pub windowed_events: u64,
    pub rate_since_start: Option<f64>,
    pub rate_in_window: Option<f64>,
    pub windowed_rate_since_start: Option<f64>,
    pub windowed_rate_in_window: Option<f64>,
}

#[derive(Debug)]
struct Rates {
    all: RateTracker,
    windowed: RateTracker,
}

impl Rates {
    fn new(averaging_time: f64, now: Instant) -> Self {
        Self {
            all: RateTracker::new(averaging_time, now),
            windowed: RateTracker::new(averaging_time, now),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Live view of the frame stream.
///
/// Frames go straight into the accumulator. Window changes are debounced
/// per axis, so a slider drag rebuilds each marginal once.
#[derive(Debug)]
pub struct LiveMonitor {
    accumulator: Arc<Mutex<MarginalAccumulator>>,
    rates: Mutex<Rates>,
    debouncers: [Debouncer; 3],
}

impl LiveMonitor {
    #[must_use]
    pub fn new(accumulator: MarginalAccumulator, averaging_time: f64, debounce: Duration) -> Self {
        Self {
            accumulator: Arc::new(Mutex::new(accumulator)),
            rates: Mutex::new(Rates::new(clamp_averaging_time(averaging_time), Instant::now())),
            debouncers: [
                Debouncer::new(debounce),
                Debouncer::new(debounce),
                Debouncer::new(debounce),
            ],
        }
    }

    /// Monitor binned on the converter's edges, with averaging time and
    /// debounce delay from `settings`.
    ///
    /// # Errors
    /// Returns an error if the converter's edges are invalid.
    pub fn from_converter(
        converter: &CoordinateConverter,
        settings: &DetectorSettings,
    ) -> Result<Self> {
        Ok(Self::new(
            MarginalAccumulator::from_converter(converter)?,
            settings.averaging_time,
            Duration::from_millis(settings.recompute_debounce_ms),
        ))
    }

    /// Ingest a frame and record its counts at the current time.
    pub fn receive_frame(&self, frame: Arc<Frame>) {
        self.receive_frame_at(frame, Instant::now());
    }

    /// Ingest a frame and record its counts at `now`.
    pub fn receive_frame_at(&self, frame: Arc<Frame>, now: Instant) {
        let total = frame.len() as u64;
        let windowed = {
            let mut accumulator = lock(&self.accumulator);
            let windowed = accumulator.count_in_windows(&frame) as u64;
            accumulator.ingest(frame);
            windowed
        };
        let mut rates = lock(&self.rates);
        rates.all.record(total, now);
        rates.windowed.record(windowed, now);
    }

    /// Feed every frame from `frames` until the channel closes, relabelling
    /// the time axis whenever `time_edges` changes.
    ///
    /// A pending edge change is applied before the next frame.
    pub async fn run(
        &self,
        mut frames: broadcast::Receiver<Arc<Frame>>,
        mut time_edges: watch::Receiver<Vec<f64>>,
    ) {
        let mut edges_open = true;
        loop {
            tokio::select! {
                biased;

                changed = time_edges.changed(), if edges_open => {
                    if changed.is_err() {
                        edges_open = false;
                        continue;
                    }
                    let edges = time_edges.borrow_and_update().clone();
                    if let Err(e) = self.set_time_edges(&edges) {
                        warn!("ignoring time-axis edges: {e}");
                    }
                }
                received = frames.recv() => match received {
                    Ok(frame) => self.receive_frame(frame),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("monitor fell behind, skipped {skipped} frames");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    /// Change the window on `axis` once the quiet period has passed. The
    /// rebuild runs on the blocking pool.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn set_window(&self, axis: Axis, low: f64, high: f64) {
        let accumulator = Arc::clone(&self.accumulator);
        self.debouncers[axis.index()].schedule(move || {
            lock(&accumulator).set_window(axis, low, high);
        });
    }

    /// Returns true while a window change on `axis` is waiting to apply.
    #[must_use]
    pub fn window_change_pending(&self, axis: Axis) -> bool {
        self.debouncers[axis.index()].is_pending()
    }

    /// Switch accumulation mode and rebuild the marginals.
    pub fn set_mode(&self, mode: AccumulationMode) {
        lock(&self.accumulator).set_mode(mode);
        debug!("accumulation mode set to {mode:?}");
    }

    /// Relabel the time axis after a timing-delay change.
    ///
    /// # Errors
    /// Returns an error if the edges change the bin count.
    pub fn set_time_edges(&self, t_edges: &[f64]) -> Result<()> {
        lock(&self.accumulator).set_time_edges(t_edges)
    }

    /// Change the averaging time; returns the clamped value applied.
    pub fn set_averaging_time(&self, seconds: f64) -> f64 {
        self.set_averaging_time_at(seconds, Instant::now())
    }

    /// [`set_averaging_time`](Self::set_averaging_time) at `now`.
    pub fn set_averaging_time_at(&self, seconds: f64, now: Instant) -> f64 {
        let applied = clamp_averaging_time(seconds);
        let mut rates = lock(&self.rates);
        rates.all.set_averaging_time(applied, now);
        rates.windowed.set_averaging_time(applied, now);
        applied
    }

    /// Clear the marginals and restart both rate trackers. Window changes
    /// still waiting on their debounce are applied now rather than lost.
    pub fn reset(&self) {
        self.reset_at(Instant::now());
    }

    /// [`reset`](Self::reset) at `now`.
    pub fn reset_at(&self, now: Instant) {
        lock(&self.accumulator).reset();
        for debouncer in &self.debouncers {
            debouncer.flush();
        }
        let mut rates = lock(&self.rates);
        rates.all.reset(now);
        rates.windowed.reset(now);
    }

    /// Copy of the marginal integrating `axis` out.
    #[must_use]
    pub fn get_marginal(&self, axis: Axis) -> Histogram2D {
        lock(&self.accumulator).get_marginal(axis).clone()
    }

    /// Copy of the marginal integrating `axis` out with its outermost bins
    /// removed, or `None` if it is too small to trim.
    #[must_use]
    pub fn get_marginal_trimmed(&self, axis: Axis) -> Option<Histogram2D> {
        lock(&self.accumulator).get_marginal(axis).trimmed()
    }

    #[must_use]
    pub fn get_1d_projection(&self, axis: Axis) -> Array1<f64> {
        lock(&self.accumulator).get_1d_projection(axis)
    }

    /// Run `f` with the accumulator locked.
    pub fn with_accumulator<R>(&self, f: impl FnOnce(&MarginalAccumulator) -> R) -> R {
        f(&lock(&self.accumulator))
    }

    /// Counts and rates as of now, so rates decay while no frames arrive.
    #[must_use]
    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshot_at(Instant::now())
    }

    /// [`snapshot`](Self::snapshot) evaluated at `now`.
    #[must_use]
    pub fn snapshot_at(&self, now: Instant) -> MonitorSnapshot {
        let rates = lock(&self.rates);
        MonitorSnapshot {
            total_events: rates.all.total(),
            windowed_events: rates.windowed.total(),
            rate_since_start: rates.all.rate_since_start_at(now),
            rate_in_window: rates.all.rate_in_window_at(now),
            windowed_rate_since_start: rates.windowed.rate_since_start_at(now),
            windowed_rate_in_window: rates.windowed.rate_in_window_at(now),
        }
    }
}
