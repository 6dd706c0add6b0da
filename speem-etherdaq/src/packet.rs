//! EtherDAQ datagram decoding.
//!
//! # Payload layout
//!
//! ```text
//! offset 0  u16 LE  event count (reported doubled by the hardware)
//! offset 2  u16 LE  packet id
//! offset 4  2 bytes padding
//! offset 6  events, 12 bytes each
//! ```
//!
//! Each event is two 6-byte half-records. A half-record is a byte-reversed
//! 48-bit word holding three 16-bit fields; the first half carries
//! `(x, y, check_xy)` and the second `(q, t, check_qt)`. The check fields are
//! static markers. The board sometimes swaps the two halves, which shows up
//! as the markers landing in each other's ranges; such events are repaired
//! by taking `(q, t, y)` instead of `(x, y, t)`.

use crate::wire::{self, Defragmenter};
use speem_core::{DetectorSettings, HitBatch, RawHit};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Bytes in the payload header.
pub const HEADER_LEN: usize = 4;
/// Padding between the header and the first event.
pub const BODY_OFFSET: usize = 2;
/// Bytes per event.
pub const EVENT_STRIDE: usize = 12;
/// Bytes per half-record.
pub const HALF_RECORD: usize = 6;

/// Valid values of the `(x, y)` half-record marker.
pub const CHECK_XY_RANGE: Range<u16> = 85..95;
/// Valid values of the `(q, t)` half-record marker.
pub const CHECK_QT_RANGE: Range<u16> = 125..135;

/// UDP source port of the detector board.
pub const DEFAULT_UDP_PORT: u16 = 60000;
/// MAC address of the detector board.
pub const DEFAULT_FPGA_MAC: [u8; 6] = [0x00, 0x0a, 0x35, 0x01, 0x02, 0x03];

/// How an event's half-records were ordered on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrder {
    /// `(x, y, check_xy)` then `(q, t, check_qt)`.
    Normal,
    /// The halves arrived swapped.
    Swapped,
}

impl EventOrder {
    /// Classify an event by its two markers; `None` if neither order fits.
    #[must_use]
    pub fn classify(first_check: u16, second_check: u16) -> Option<Self> {
        if CHECK_XY_RANGE.contains(&first_check) && CHECK_QT_RANGE.contains(&second_check) {
            Some(Self::Normal)
        } else if CHECK_QT_RANGE.contains(&first_check) && CHECK_XY_RANGE.contains(&second_check) {
            Some(Self::Swapped)
        } else {
            None
        }
    }
}

/// Read a half-record as its three fields in wire order.
#[inline]
#[must_use]
pub fn read_half_record(bytes: &[u8; HALF_RECORD]) -> [u16; 3] {
    [
        u16::from_le_bytes([bytes[4], bytes[5]]),
        u16::from_le_bytes([bytes[2], bytes[3]]),
        u16::from_le_bytes([bytes[0], bytes[1]]),
    ]
}

/// Decode one 12-byte event, repairing swapped halves.
#[must_use]
pub fn decode_event(bytes: &[u8; EVENT_STRIDE]) -> Option<(RawHit, EventOrder)> {
    let (first, second) = bytes.split_at(HALF_RECORD);
    let [x, y, check_xy] = read_half_record(first.try_into().ok()?);
    let [q, t, check_qt] = read_half_record(second.try_into().ok()?);

    match EventOrder::classify(check_xy, check_qt)? {
        EventOrder::Normal => Some((RawHit::new(x, y, t), EventOrder::Normal)),
        EventOrder::Swapped => Some((RawHit::new(q, t, y), EventOrder::Swapped)),
    }
}

/// Running decode counters, shared with whoever wants diagnostics.
#[derive(Debug, Default)]
pub struct DecodeStats {
    packets: AtomicU64,
    rejected_packets: AtomicU64,
    events: AtomicU64,
    dropped_events: AtomicU64,
    swapped_events: AtomicU64,
}

/// A point-in-time copy of [`DecodeStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeCounts {
    /// Payloads decoded into a batch.
    pub packets: u64,
    /// Frames discarded for source, protocol or length.
    pub rejected_packets: u64,
    /// Events accepted.
    pub events: u64,
    /// Events that failed both marker checks or were truncated.
    pub dropped_events: u64,
    /// Accepted events that needed the swap repair.
    pub swapped_events: u64,
}

impl DecodeStats {
    /// Copy the current counters.
    #[must_use]
    pub fn snapshot(&self) -> DecodeCounts {
        DecodeCounts {
            packets: self.packets.load(Ordering::Relaxed),
            rejected_packets: self.rejected_packets.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            swapped_events: self.swapped_events.load(Ordering::Relaxed),
        }
    }

    fn reject(&self) {
        self.rejected_packets.fetch_add(1, Ordering::Relaxed);
    }
}

/// Decoder for frames captured from the detector's network segment.
///
/// Foreign and malformed frames are silently discarded; the only trace they
/// leave is in [`DecodeStats`].
#[derive(Debug)]
pub struct PacketDecoder {
    source_mac: [u8; 6],
    udp_port: u16,
    stats: Arc<DecodeStats>,
    defragmenter: Defragmenter,
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_FPGA_MAC, DEFAULT_UDP_PORT)
    }
}

impl PacketDecoder {
    /// Creates a decoder accepting frames from `source_mac` and UDP `udp_port`.
    #[must_use]
    pub fn new(source_mac: [u8; 6], udp_port: u16) -> Self {
        Self {
            source_mac,
            udp_port,
            stats: Arc::new(DecodeStats::default()),
            defragmenter: Defragmenter::new(),
        }
    }

    /// Creates a decoder for the source configured in `settings`.
    ///
    /// # Errors
    /// Returns an error if the configured MAC address is malformed.
    pub fn from_settings(settings: &DetectorSettings) -> speem_core::Result<Self> {
        Ok(Self::new(settings.mac_address()?, settings.udp_port))
    }

    /// Shared handle to the decode counters.
    #[must_use]
    pub fn stats(&self) -> Arc<DecodeStats> {
        Arc::clone(&self.stats)
    }

    /// Decode a captured Ethernet frame.
    ///
    /// Returns `None` for frames from another MAC address, non-UDP traffic,
    /// a foreign source port, fragments still awaiting the rest of their
    /// datagram, and payloads too short to hold a header.
    pub fn decode(&mut self, frame: &[u8]) -> Option<HitBatch> {
        let Some(ethernet) = wire::parse_ethernet(frame) else {
            self.stats.reject();
            return None;
        };
        if ethernet.source != self.source_mac || !ethernet.is_ipv4() {
            self.stats.reject();
            return None;
        }
        let Some(ip) = wire::parse_ipv4(&frame[ethernet.payload_offset..]) else {
            self.stats.reject();
            return None;
        };
        if !ip.is_udp() {
            self.stats.reject();
            return None;
        }

        if ip.is_fragment() {
            let datagram = self.defragmenter.push(&ip, Instant::now())?;
            self.decode_udp(&datagram)
        } else {
            self.decode_udp(ip.payload)
        }
    }

    fn decode_udp(&self, bytes: &[u8]) -> Option<HitBatch> {
        let Some(udp) = wire::parse_udp(bytes) else {
            self.stats.reject();
            return None;
        };
        if udp.source_port != self.udp_port {
            self.stats.reject();
            return None;
        }
        self.decode_payload(udp.payload)
    }

    /// Decode a UDP payload into a batch of hits.
    ///
    /// Events failing both marker checks are dropped and counted; the rest
    /// of the packet still decodes. Events announced by the header but
    /// missing from a truncated payload are counted as dropped.
    pub fn decode_payload(&self, payload: &[u8]) -> Option<HitBatch> {
        if payload.len() < HEADER_LEN {
            self.stats.reject();
            return None;
        }
        let doubled_count = u16::from_le_bytes([payload[0], payload[1]]);
        let packet_id = u16::from_le_bytes([payload[2], payload[3]]);
        let announced = usize::from(doubled_count / 2);

        let body = payload.get(HEADER_LEN + BODY_OFFSET..).unwrap_or_default();
        let mut hits = Vec::with_capacity(announced);
        let mut dropped = 0u64;
        let mut swapped = 0u64;
        let mut present = 0usize;

        for chunk in body.chunks_exact(EVENT_STRIDE).take(announced) {
            present += 1;
            let Ok(event) = <&[u8; EVENT_STRIDE]>::try_from(chunk) else {
                dropped += 1;
                continue;
            };
            match decode_event(event) {
                Some((hit, order)) => {
                    if order == EventOrder::Swapped {
                        swapped += 1;
                    }
                    hits.push(hit);
                }
                None => dropped += 1,
            }
        }
        dropped += (announced - present) as u64;

        self.stats.packets.fetch_add(1, Ordering::Relaxed);
        self.stats
            .events
            .fetch_add(hits.len() as u64, Ordering::Relaxed);
        self.stats.dropped_events.fetch_add(dropped, Ordering::Relaxed);
        self.stats.swapped_events.fetch_add(swapped, Ordering::Relaxed);

        Some(HitBatch::new(packet_id, hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{encode_event, encode_payload, EventRecord};

    #[test]
    fn test_read_half_record_byte_reversed() {
        // Fields (0x1234, 0x5678, 90) as a reversed 48-bit word.
        let half = [90, 0, 0x78, 0x56, 0x34, 0x12];
        assert_eq!(read_half_record(&half), [0x1234, 0x5678, 90]);
    }

    #[test]
    fn test_classify() {
        assert_eq!(EventOrder::classify(85, 125), Some(EventOrder::Normal));
        assert_eq!(EventOrder::classify(94, 134), Some(EventOrder::Normal));
        assert_eq!(EventOrder::classify(130, 90), Some(EventOrder::Swapped));
        assert_eq!(EventOrder::classify(95, 130), None);
        assert_eq!(EventOrder::classify(90, 135), None);
        assert_eq!(EventOrder::classify(90, 90), None);
    }

    #[test]
    fn test_decode_event_normal_and_swapped() {
        let record = EventRecord::new(100, 200, 7, 300);
        let (hit, order) = decode_event(&encode_event(&record, false)).unwrap();
        assert_eq!((hit, order), (RawHit::new(100, 200, 300), EventOrder::Normal));

        let (hit, order) = decode_event(&encode_event(&record, true)).unwrap();
        assert_eq!((hit, order), (RawHit::new(100, 200, 300), EventOrder::Swapped));
    }

    #[test]
    fn test_short_payload_rejected() {
        let decoder = PacketDecoder::default();
        assert!(decoder.decode_payload(&[1, 2, 3]).is_none());
        assert_eq!(decoder.stats().snapshot().rejected_packets, 1);
    }

    #[test]
    fn test_header_only_payload_is_empty_batch() {
        let decoder = PacketDecoder::default();
        let batch = decoder.decode_payload(&encode_payload(42, &[])).unwrap();
        assert_eq!(batch.packet_id, 42);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_truncated_payload_counts_missing_events() {
        let decoder = PacketDecoder::default();
        let events: Vec<_> = (0..4)
            .map(|i| encode_event(&EventRecord::new(i, i, 0, i), false))
            .collect();
        let mut payload = encode_payload(1, &events);
        payload.truncate(payload.len() - EVENT_STRIDE - 5);

        let batch = decoder.decode_payload(&payload).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(decoder.stats().snapshot().dropped_events, 2);
    }
}
