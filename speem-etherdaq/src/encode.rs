//! Builders for EtherDAQ datagrams.
//!
//! Used by the synthetic source to emit wire-format packets and by tests to
//! construct frames the decoder must accept or reject.

use crate::packet::{BODY_OFFSET, EVENT_STRIDE, HALF_RECORD, HEADER_LEN};
use crate::wire::{ETHERNET_HEADER_LEN, UDP_HEADER_LEN};

/// Marker written into the `(x, y)` half-record.
pub const CHECK_XY_MARKER: u16 = 90;
/// Marker written into the `(q, t)` half-record.
pub const CHECK_QT_MARKER: u16 = 130;

const IPV4_HEADER_LEN: usize = 20;

/// Field values of one detector event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub x: u16,
    pub y: u16,
    pub q: u16,
    pub t: u16,
    pub check_xy: u16,
    pub check_qt: u16,
}

impl EventRecord {
    /// An event carrying the standard markers.
    #[must_use]
    pub fn new(x: u16, y: u16, q: u16, t: u16) -> Self {
        Self {
            x,
            y,
            q,
            t,
            check_xy: CHECK_XY_MARKER,
            check_qt: CHECK_QT_MARKER,
        }
    }

    /// Override both markers.
    #[must_use]
    pub fn with_checks(mut self, check_xy: u16, check_qt: u16) -> Self {
        self.check_xy = check_xy;
        self.check_qt = check_qt;
        self
    }
}

/// Write three fields as a byte-reversed 48-bit half-record.
#[must_use]
pub fn write_half_record(fields: [u16; 3]) -> [u8; HALF_RECORD] {
    let [a, b, c] = fields;
    let mut out = [0u8; HALF_RECORD];
    out[0..2].copy_from_slice(&c.to_le_bytes());
    out[2..4].copy_from_slice(&b.to_le_bytes());
    out[4..6].copy_from_slice(&a.to_le_bytes());
    out
}

/// Encode an event, optionally with its halves swapped as the hardware
/// occasionally does.
#[must_use]
pub fn encode_event(record: &EventRecord, swapped: bool) -> [u8; EVENT_STRIDE] {
    let xy = write_half_record([record.x, record.y, record.check_xy]);
    let qt = write_half_record([record.q, record.t, record.check_qt]);
    let (first, second) = if swapped { (qt, xy) } else { (xy, qt) };

    let mut out = [0u8; EVENT_STRIDE];
    out[..HALF_RECORD].copy_from_slice(&first);
    out[HALF_RECORD..].copy_from_slice(&second);
    out
}

/// Build a UDP payload: header, padding and events.
///
/// The event count is written doubled, as the hardware reports it.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode_payload(packet_id: u16, events: &[[u8; EVENT_STRIDE]]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(HEADER_LEN + BODY_OFFSET + events.len() * EVENT_STRIDE);
    let doubled = (events.len() * 2).min(usize::from(u16::MAX)) as u16;
    payload.extend_from_slice(&doubled.to_le_bytes());
    payload.extend_from_slice(&packet_id.to_le_bytes());
    payload.extend_from_slice(&[0u8; BODY_OFFSET]);
    for event in events {
        payload.extend_from_slice(event);
    }
    payload
}

/// Wrap a UDP payload in UDP, IPv4 and Ethernet II headers.
///
/// Checksums are left zero; the decoder does not verify them.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode_frame(source_mac: [u8; 6], source_port: u16, payload: &[u8]) -> Vec<u8> {
    let udp_len = UDP_HEADER_LEN + payload.len();
    let ip_len = IPV4_HEADER_LEN + udp_len;
    let mut frame = Vec::with_capacity(ETHERNET_HEADER_LEN + ip_len);

    // Ethernet II
    frame.extend_from_slice(&[0xff; 6]);
    frame.extend_from_slice(&source_mac);
    frame.extend_from_slice(&0x0800u16.to_be_bytes());

    // IPv4, no options, not fragmented
    frame.push(0x45);
    frame.push(0);
    frame.extend_from_slice(&(ip_len as u16).to_be_bytes());
    frame.extend_from_slice(&[0, 0, 0, 0]);
    frame.push(64);
    frame.push(17);
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(&[192, 168, 0, 5]);
    frame.extend_from_slice(&[192, 168, 0, 1]);

    // UDP
    frame.extend_from_slice(&source_port.to_be_bytes());
    frame.extend_from_slice(&source_port.to_be_bytes());
    frame.extend_from_slice(&(udp_len as u16).to_be_bytes());
    frame.extend_from_slice(&[0, 0]);

    frame.extend_from_slice(payload);
    frame
}
