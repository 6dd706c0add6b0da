//! End-to-end tests from Ethernet frames to converted frames.

use speem_core::{CalibrationModel, CoordinateConverter, DetectorSettings, RawHit};
use speem_etherdaq::packet::{DEFAULT_FPGA_MAC, DEFAULT_UDP_PORT};
use speem_etherdaq::{
    encode_event, encode_frame, encode_payload, BatchQueue, EventRecord, FrameAssembler,
    PacketDecoder,
};
use std::sync::Arc;
use std::time::Duration;

fn records(n: u16, seed: u16) -> Vec<EventRecord> {
    (0..n)
        .map(|i| {
            let v = i.wrapping_mul(37).wrapping_add(seed) % 4096;
            EventRecord::new(v, 4095 - v, i, (v * 3) % 4096)
        })
        .collect()
}

fn frame_for(records: &[EventRecord], packet_id: u16, swapped: bool) -> Vec<u8> {
    let events: Vec<_> = records.iter().map(|r| encode_event(r, swapped)).collect();
    encode_frame(
        DEFAULT_FPGA_MAC,
        DEFAULT_UDP_PORT,
        &encode_payload(packet_id, &events),
    )
}

#[test]
fn test_decode_round_trip_preserves_order() {
    let mut decoder = PacketDecoder::default();
    let sent = records(250, 11);
    let batch = decoder.decode(&frame_for(&sent, 9, false)).unwrap();

    assert_eq!(batch.packet_id, 9);
    let expected: Vec<_> = sent.iter().map(|r| RawHit::new(r.x, r.y, r.t)).collect();
    assert_eq!(batch.hits, expected);
    assert_eq!(decoder.stats().snapshot().dropped_events, 0);
}

#[test]
fn test_swapped_markers_take_q_t_y() {
    // Every event arrives as (a, b, 130) followed by (c, d, 90).
    let literal: Vec<_> = (0..20u16)
        .map(|i| EventRecord::new(i, i + 100, i + 200, i + 300).with_checks(130, 90))
        .collect();
    let events: Vec<_> = literal.iter().map(|r| encode_event(r, false)).collect();
    let payload = encode_payload(1, &events);

    let decoder = PacketDecoder::default();
    let batch = decoder.decode_payload(&payload).unwrap();
    let expected: Vec<_> = literal.iter().map(|r| RawHit::new(r.q, r.t, r.y)).collect();
    assert_eq!(batch.hits, expected);
    assert_eq!(decoder.stats().snapshot().swapped_events, 20);
}

#[test]
fn test_hardware_swap_recovers_original_hits() {
    let mut decoder = PacketDecoder::default();
    let sent = records(50, 3);
    let batch = decoder.decode(&frame_for(&sent, 2, true)).unwrap();
    let expected: Vec<_> = sent.iter().map(|r| RawHit::new(r.x, r.y, r.t)).collect();
    assert_eq!(batch.hits, expected);
}

#[test]
fn test_unrecoverable_events_dropped_rest_kept() {
    let mut sent = records(10, 5);
    sent[3] = sent[3].with_checks(90, 90);
    sent[7] = sent[7].with_checks(0, 200);

    let mut decoder = PacketDecoder::default();
    let batch = decoder.decode(&frame_for(&sent, 4, false)).unwrap();

    let expected: Vec<_> = sent
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 3 && *i != 7)
        .map(|(_, r)| RawHit::new(r.x, r.y, r.t))
        .collect();
    assert_eq!(batch.hits, expected);

    let counts = decoder.stats().snapshot();
    assert_eq!(counts.dropped_events, 2);
    assert_eq!(counts.events, 8);
}

#[test]
fn test_foreign_mac_and_port_rejected() {
    let payload = encode_payload(0, &[encode_event(&EventRecord::new(1, 2, 3, 4), false)]);
    let mut decoder = PacketDecoder::default();

    let other_mac = encode_frame([0x02, 0, 0, 0, 0, 1], DEFAULT_UDP_PORT, &payload);
    assert!(decoder.decode(&other_mac).is_none());

    let other_port = encode_frame(DEFAULT_FPGA_MAC, DEFAULT_UDP_PORT + 1, &payload);
    assert!(decoder.decode(&other_port).is_none());

    assert!(decoder.decode(&[0u8; 10]).is_none());

    let counts = decoder.stats().snapshot();
    assert_eq!(counts.rejected_packets, 3);
    assert_eq!(counts.packets, 0);
}

#[tokio::test(start_paused = true)]
async fn test_three_packets_in_one_window() {
    let settings = DetectorSettings::default();
    let converter = CoordinateConverter::new(&settings, CalibrationModel::new(20.0, 0.25).unwrap());
    let queue = Arc::new(BatchQueue::default());
    let assembler = FrameAssembler::new(Arc::clone(&queue), 1.0);

    let producer = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            let mut decoder = PacketDecoder::default();
            for id in 0..3u16 {
                let frame = frame_for(&records(100, id * 7), id, id == 1);
                if let Some(batch) = decoder.decode(&frame) {
                    queue.push(batch);
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        })
    };

    let raw = assembler.read_frame(Duration::from_secs_f64(1.0)).await;
    producer.await.unwrap();
    assert_eq!(raw.len(), 300);

    let frame = converter.convert(&raw);
    assert_eq!(frame.len(), 300);
    let (low, high) = converter.time_range();
    assert!(frame.column(2).iter().all(|t| (low..=high).contains(t)));
}
