//! Packet sources feeding the batch queue.
//!
//! A source runs on its own thread and pushes every decoded batch onto a
//! shared [`BatchQueue`]. The live pcap source lives in
//! [`capture`](crate::capture) behind the `live-capture` feature; the
//! [`SyntheticSource`] here generates random events without hardware.

use crate::encode::{encode_event, encode_payload, EventRecord};
use crate::packet::{DecodeStats, PacketDecoder};
use crate::{BatchQueue, Error, Result};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use speem_core::HitBatch;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Largest event count a payload header can announce.
pub const MAX_EVENTS_PER_PACKET: usize = (u16::MAX / 2) as usize;

/// Producer of hit batches.
pub trait HitSource: Send + Sync {
    /// Start producing batches in the background.
    ///
    /// # Errors
    /// Returns an error if the source is already running or cannot be opened.
    fn start(&mut self) -> Result<()>;

    /// Stop producing and wait for the background thread to finish.
    ///
    /// # Errors
    /// Returns an error if the background thread panicked.
    fn stop(&mut self) -> Result<()>;

    /// Returns true while the background thread is producing.
    fn is_running(&self) -> bool;

    /// The queue this source pushes onto.
    fn queue(&self) -> &Arc<BatchQueue>;

    /// Decode counters of this source.
    fn decode_stats(&self) -> Arc<DecodeStats>;

    /// Take whatever is queued right now, oldest first. Never blocks.
    fn poll(&self) -> std::vec::IntoIter<HitBatch> {
        self.queue().drain().into_iter()
    }

    /// Drop everything queued so far.
    fn discard_all(&self) -> usize {
        self.queue().discard_all()
    }
}

/// Configuration for [`SyntheticSource`].
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Events per packet, drawn uniformly.
    pub events_per_packet: RangeInclusive<usize>,
    /// Raw bins per channel; coordinates are drawn from `0..bins_per_channel`.
    pub bins_per_channel: u16,
    /// Time between packets.
    pub packet_interval: Duration,
    /// Probability that an event's halves are swapped on the wire.
    pub swap_probability: f64,
    /// Probability that an event carries invalid markers.
    pub corrupt_probability: f64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            events_per_packet: 100..=1000,
            bins_per_channel: 4096,
            packet_interval: Duration::from_millis(10),
            swap_probability: 0.0,
            corrupt_probability: 0.0,
            seed: 0x5EE3,
        }
    }
}

/// Deterministic generator of wire-format packets.
///
/// Each packet is encoded exactly as the detector board would send it and
/// passed through a [`PacketDecoder`], so swap repair and drop accounting
/// are exercised the same way as with live data.
#[derive(Debug)]
pub struct SyntheticGenerator {
    config: SyntheticConfig,
    rng: StdRng,
    decoder: PacketDecoder,
    next_packet_id: u16,
}

impl SyntheticGenerator {
    /// Creates a generator; the same config always yields the same batches.
    #[must_use]
    pub fn new(mut config: SyntheticConfig) -> Self {
        let (low, high) = config.events_per_packet.clone().into_inner();
        let (low, high) = (low.min(high), low.max(high));
        config.events_per_packet = low.min(MAX_EVENTS_PER_PACKET)..=high.min(MAX_EVENTS_PER_PACKET);
        config.bins_per_channel = config.bins_per_channel.max(1);
        config.swap_probability = probability(config.swap_probability);
        config.corrupt_probability = probability(config.corrupt_probability);

        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            decoder: PacketDecoder::default(),
            next_packet_id: 0,
        }
    }

    /// Decode counters of the internal decoder.
    #[must_use]
    pub fn decode_stats(&self) -> Arc<DecodeStats> {
        self.decoder.stats()
    }

    /// Generate, encode and decode one packet.
    pub fn next_batch(&mut self) -> Option<HitBatch> {
        let count = self.rng.gen_range(self.config.events_per_packet.clone());
        let bins = self.config.bins_per_channel;

        let events: Vec<_> = (0..count)
            .map(|_| {
                let mut record = EventRecord::new(
                    self.rng.gen_range(0..bins),
                    self.rng.gen_range(0..bins),
                    self.rng.gen(),
                    self.rng.gen_range(0..bins),
                );
                if self.rng.gen_bool(self.config.corrupt_probability) {
                    record = record.with_checks(0, 0);
                }
                let swapped = self.rng.gen_bool(self.config.swap_probability);
                encode_event(&record, swapped)
            })
            .collect();

        let payload = encode_payload(self.next_packet_id, &events);
        self.next_packet_id = self.next_packet_id.wrapping_add(1);
        self.decoder.decode_payload(&payload)
    }
}

fn probability(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

/// Benchmark source producing random packets on a background thread.
pub struct SyntheticSource {
    queue: Arc<BatchQueue>,
    stats: Arc<DecodeStats>,
    interval: Duration,
    running: Arc<AtomicBool>,
    generator: Option<SyntheticGenerator>,
    handle: Option<JoinHandle<SyntheticGenerator>>,
}

impl SyntheticSource {
    /// Creates a stopped source pushing onto `queue`.
    #[must_use]
    pub fn new(config: SyntheticConfig, queue: Arc<BatchQueue>) -> Self {
        let interval = config.packet_interval;
        let generator = SyntheticGenerator::new(config);
        Self {
            queue,
            stats: generator.decode_stats(),
            interval,
            running: Arc::new(AtomicBool::new(false)),
            generator: Some(generator),
            handle: None,
        }
    }

    /// Produce one batch synchronously. Returns `None` while the background
    /// thread owns the generator.
    pub fn generate_batch(&mut self) -> Option<HitBatch> {
        self.generator.as_mut()?.next_batch()
    }
}

impl HitSource for SyntheticSource {
    fn start(&mut self) -> Result<()> {
        let mut generator = self.generator.take().ok_or(Error::AlreadyRunning)?;
        let queue = Arc::clone(&self.queue);
        let running = Arc::clone(&self.running);
        let interval = self.interval;
        running.store(true, Ordering::Release);

        let handle = thread::Builder::new()
            .name("speem-synthetic".into())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    if let Some(batch) = generator.next_batch() {
                        queue.push(batch);
                    }
                    thread::sleep(interval);
                }
                generator
            })?;

        self.handle = Some(handle);
        info!("synthetic source started, one packet every {interval:?}");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let generator = handle
                .join()
                .map_err(|_| Error::Thread("synthetic generator panicked".into()))?;
            self.generator = Some(generator);
            debug!("synthetic source stopped");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    fn queue(&self) -> &Arc<BatchQueue> {
        &self.queue
    }

    fn decode_stats(&self) -> Arc<DecodeStats> {
        Arc::clone(&self.stats)
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> SyntheticConfig {
        SyntheticConfig {
            events_per_packet: 10..=20,
            bins_per_channel: 512,
            seed,
            ..SyntheticConfig::default()
        }
    }

    #[test]
    fn test_generator_deterministic() {
        let mut a = SyntheticGenerator::new(config(7));
        let mut b = SyntheticGenerator::new(config(7));
        for _ in 0..5 {
            assert_eq!(a.next_batch().unwrap().hits, b.next_batch().unwrap().hits);
        }
    }

    #[test]
    fn test_generator_ranges() {
        let mut generator = SyntheticGenerator::new(config(1));
        for expected_id in 0..20u16 {
            let batch = generator.next_batch().unwrap();
            assert_eq!(batch.packet_id, expected_id);
            assert!((10..=20).contains(&batch.len()));
            assert!(batch.hits.iter().all(|h| h.x < 512 && h.y < 512 && h.t < 512));
        }
    }

    #[test]
    fn test_generator_swapped_events_survive() {
        let mut generator = SyntheticGenerator::new(SyntheticConfig {
            swap_probability: 1.0,
            ..config(3)
        });
        let batch = generator.next_batch().unwrap();
        let counts = generator.decode_stats().snapshot();
        assert_eq!(counts.swapped_events, batch.len() as u64);
        assert_eq!(counts.dropped_events, 0);
    }

    #[test]
    fn test_generator_corrupt_events_dropped() {
        let mut generator = SyntheticGenerator::new(SyntheticConfig {
            corrupt_probability: 1.0,
            ..config(3)
        });
        let batch = generator.next_batch().unwrap();
        assert!(batch.is_empty());
        assert!(generator.decode_stats().snapshot().dropped_events >= 10);
    }

    #[test]
    fn test_generate_batch_only_while_stopped() {
        let queue = Arc::new(BatchQueue::new(16));
        let mut source = SyntheticSource::new(config(9), queue);
        assert_eq!(source.generate_batch().unwrap().packet_id, 0);
        source.start().unwrap();
        assert!(source.generate_batch().is_none());
        source.stop().unwrap();
        assert!(source.generate_batch().is_some());
    }

    #[test]
    fn test_source_start_stop() {
        let queue = Arc::new(BatchQueue::new(1024));
        let mut source = SyntheticSource::new(
            SyntheticConfig {
                packet_interval: Duration::from_millis(1),
                ..config(5)
            },
            Arc::clone(&queue),
        );
        source.start().unwrap();
        assert!(source.is_running());
        assert!(matches!(source.start(), Err(Error::AlreadyRunning)));

        while queue.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        source.stop().unwrap();
        assert!(!source.is_running());

        let polled: Vec<_> = source.poll().collect();
        assert!(!polled.is_empty());
        assert!(polled.windows(2).all(|w| w[1].packet_id == w[0].packet_id + 1));
    }
}
