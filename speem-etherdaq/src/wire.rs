//! Ethernet / IPv4 / UDP framing around EtherDAQ payloads.
//!
//! Large detector datagrams arrive as IPv4 fragments; [`Defragmenter`]
//! reassembles them before the UDP header is read.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Length of an untagged Ethernet II header.
pub const ETHERNET_HEADER_LEN: usize = 14;
/// UDP header length.
pub const UDP_HEADER_LEN: usize = 8;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_VLAN: u16 = 0x8100;
const IPPROTO_UDP: u8 = 17;

/// Incomplete datagrams older than this are discarded.
const REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(1);
/// Upper bound on datagrams being reassembled at once.
const MAX_PENDING: usize = 64;

/// Ethernet II header fields the decoder cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub source: [u8; 6],
    pub ethertype: u16,
    /// Offset of the network-layer header.
    pub payload_offset: usize,
}

/// Parse an Ethernet II header, skipping one 802.1Q tag if present.
#[must_use]
pub fn parse_ethernet(frame: &[u8]) -> Option<EthernetHeader> {
    if frame.len() < ETHERNET_HEADER_LEN {
        return None;
    }
    let mut source = [0u8; 6];
    source.copy_from_slice(&frame[6..12]);
    let mut ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    let mut payload_offset = ETHERNET_HEADER_LEN;

    if ethertype == ETHERTYPE_VLAN {
        if frame.len() < ETHERNET_HEADER_LEN + 4 {
            return None;
        }
        ethertype = u16::from_be_bytes([frame[16], frame[17]]);
        payload_offset += 4;
    }

    Some(EthernetHeader {
        source,
        ethertype,
        payload_offset,
    })
}

impl EthernetHeader {
    /// Returns true if the frame carries IPv4.
    #[must_use]
    pub fn is_ipv4(&self) -> bool {
        self.ethertype == ETHERTYPE_IPV4
    }
}

/// A parsed IPv4 packet (or fragment).
#[derive(Debug, Clone, Copy)]
pub struct Ipv4Packet<'a> {
    pub source: [u8; 4],
    pub identification: u16,
    pub protocol: u8,
    pub more_fragments: bool,
    /// Fragment offset in bytes.
    pub fragment_offset: usize,
    /// Payload, trimmed to the header's total length.
    pub payload: &'a [u8],
}

impl Ipv4Packet<'_> {
    /// Returns true if this packet is part of a fragmented datagram.
    #[must_use]
    pub fn is_fragment(&self) -> bool {
        self.more_fragments || self.fragment_offset > 0
    }

    /// Returns true if the packet carries UDP.
    #[must_use]
    pub fn is_udp(&self) -> bool {
        self.protocol == IPPROTO_UDP
    }
}

/// Parse an IPv4 header.
#[must_use]
pub fn parse_ipv4(bytes: &[u8]) -> Option<Ipv4Packet<'_>> {
    if bytes.len() < 20 || bytes[0] >> 4 != 4 {
        return None;
    }
    let header_len = usize::from(bytes[0] & 0x0f) * 4;
    let total_len = usize::from(u16::from_be_bytes([bytes[2], bytes[3]]));
    if header_len < 20 || bytes.len() < header_len || total_len < header_len {
        return None;
    }
    // Ethernet pads short frames; the IP total length is authoritative.
    let end = total_len.min(bytes.len());
    let flags_fragment = u16::from_be_bytes([bytes[6], bytes[7]]);

    Some(Ipv4Packet {
        source: [bytes[12], bytes[13], bytes[14], bytes[15]],
        identification: u16::from_be_bytes([bytes[4], bytes[5]]),
        protocol: bytes[9],
        more_fragments: flags_fragment & 0x2000 != 0,
        fragment_offset: usize::from(flags_fragment & 0x1fff) * 8,
        payload: &bytes[header_len..end],
    })
}

/// A UDP datagram borrowed from its IP payload.
#[derive(Debug, Clone, Copy)]
pub struct UdpDatagram<'a> {
    pub source_port: u16,
    pub destination_port: u16,
    pub payload: &'a [u8],
}

/// Parse a UDP header.
#[must_use]
pub fn parse_udp(bytes: &[u8]) -> Option<UdpDatagram<'_>> {
    if bytes.len() < UDP_HEADER_LEN {
        return None;
    }
    let length = usize::from(u16::from_be_bytes([bytes[4], bytes[5]]));
    let end = if length >= UDP_HEADER_LEN {
        length.min(bytes.len())
    } else {
        bytes.len()
    };
    Some(UdpDatagram {
        source_port: u16::from_be_bytes([bytes[0], bytes[1]]),
        destination_port: u16::from_be_bytes([bytes[2], bytes[3]]),
        payload: &bytes[UDP_HEADER_LEN..end],
    })
}

#[derive(Debug)]
struct PartialDatagram {
    fragments: BTreeMap<usize, Vec<u8>>,
    total_len: Option<usize>,
    first_seen: Instant,
}

/// IPv4 fragment reassembly keyed by source address and identification.
#[derive(Debug, Default)]
pub struct Defragmenter {
    pending: HashMap<([u8; 4], u16), PartialDatagram>,
}

impl Defragmenter {
    /// Creates an empty reassembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fragment; returns the full IP payload once every byte is present.
    pub fn push(&mut self, packet: &Ipv4Packet<'_>, now: Instant) -> Option<Vec<u8>> {
        self.pending
            .retain(|_, p| now.saturating_duration_since(p.first_seen) < REASSEMBLY_TIMEOUT);

        let key = (packet.source, packet.identification);
        if self.pending.len() >= MAX_PENDING && !self.pending.contains_key(&key) {
            return None;
        }

        let partial = self.pending.entry(key).or_insert_with(|| PartialDatagram {
            fragments: BTreeMap::new(),
            total_len: None,
            first_seen: now,
        });
        if !packet.more_fragments {
            partial.total_len = Some(packet.fragment_offset + packet.payload.len());
        }
        partial
            .fragments
            .insert(packet.fragment_offset, packet.payload.to_vec());

        let total_len = partial.total_len?;
        let mut covered = 0;
        for (&offset, data) in &partial.fragments {
            if offset > covered {
                return None;
            }
            covered = covered.max(offset + data.len());
        }
        if covered < total_len {
            return None;
        }

        let partial = self.pending.remove(&key)?;
        let mut datagram = vec![0u8; total_len];
        for (offset, data) in partial.fragments {
            let end = (offset + data.len()).min(total_len);
            if offset < end {
                datagram[offset..end].copy_from_slice(&data[..end - offset]);
            }
        }
        Some(datagram)
    }

    /// Number of datagrams waiting for more fragments.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
