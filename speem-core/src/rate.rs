//! Sliding-window count-rate estimation.

use std::collections::VecDeque;
use std::time::Instant;

/// Tracks event counts and reports average rates since start and over a
/// trailing averaging window.
///
/// Samples older than the averaging time are trimmed from the front on every
/// [`record`](Self::record). Changing the averaging time drops all retained
/// samples and restarts the window; old samples are not re-windowed.
#[derive(Debug, Clone)]
pub struct RateTracker {
    averaging_time: f64,
    start: Instant,
    window_start: Instant,
    last_update: Instant,
    total: u64,
    samples: VecDeque<(u64, Instant)>,
}

impl RateTracker {
    /// Creates a tracker whose start and window start are `now`.
    #[must_use]
    pub fn new(averaging_time: f64, now: Instant) -> Self {
        Self {
            averaging_time,
            start: now,
            window_start: now,
            last_update: now,
            total: 0,
            samples: VecDeque::new(),
        }
    }

    /// Record `count` events observed at `timestamp`.
    pub fn record(&mut self, count: u64, timestamp: Instant) {
        self.total += count;
        self.samples.push_back((count, timestamp));
        self.last_update = self.last_update.max(timestamp);

        while let Some(&(_, sampled_at)) = self.samples.front() {
            if age(timestamp, sampled_at) > self.averaging_time {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Average rate since start, evaluated at the latest record rather than
    /// the current time. Use [`rate_since_start_at`](Self::rate_since_start_at)
    /// for a rate that keeps falling while nothing is recorded.
    ///
    /// `None` until time has passed since start.
    #[must_use]
    pub fn rate_since_start(&self) -> Option<f64> {
        self.rate_since_start_at(self.last_update)
    }

    /// Average rate over the trailing window, evaluated at the latest record.
    /// This holds its last value while nothing is recorded; see
    /// [`rate_in_window_at`](Self::rate_in_window_at).
    #[must_use]
    pub fn rate_in_window(&self) -> Option<f64> {
        self.rate_in_window_at(self.last_update)
    }

    /// Average rate since start, evaluated at `now`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate_since_start_at(&self, now: Instant) -> Option<f64> {
        let elapsed = age(now, self.start);
        (elapsed > 0.0).then(|| self.total as f64 / elapsed)
    }

    /// Average rate over `[now - averaging_time, now]`.
    ///
    /// The denominator is the shorter of the time since the window started
    /// and the averaging time, so the rate is meaningful before a full window
    /// has elapsed.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate_in_window_at(&self, now: Instant) -> Option<f64> {
        let span = age(now, self.window_start).min(self.averaging_time);
        if span <= 0.0 {
            return None;
        }
        let in_window: u64 = self
            .samples
            .iter()
            .filter(|(_, sampled_at)| {
                *sampled_at <= now && age(now, *sampled_at) <= self.averaging_time
            })
            .map(|(count, _)| count)
            .sum();
        Some(in_window as f64 / span)
    }

    /// Total events recorded since start.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Averaging window length in seconds.
    #[must_use]
    pub fn averaging_time(&self) -> f64 {
        self.averaging_time
    }

    /// Number of samples currently retained.
    #[must_use]
    pub fn retained(&self) -> usize {
        self.samples.len()
    }

    /// Change the averaging time, clearing retained samples and restarting
    /// the window at `now`. The since-start total is kept.
    pub fn set_averaging_time(&mut self, averaging_time: f64, now: Instant) {
        self.averaging_time = averaging_time;
        self.window_start = now;
        self.samples.clear();
    }

    /// Forget everything and restart at `now`.
    pub fn reset(&mut self, now: Instant) {
        *self = Self::new(self.averaging_time, now);
    }
}

/// Seconds from `earlier` to `later`, zero if `earlier` is later.
fn age(later: Instant, earlier: Instant) -> f64 {
    later.saturating_duration_since(earlier).as_secs_f64()
}
