//! Live packet capture with libpcap.

use crate::packet::{DecodeStats, PacketDecoder};
use crate::source::HitSource;
use crate::{BatchQueue, Error, Result};
use log::{debug, error, info};
use pcap::{Active, Capture, Device};
use speem_core::{DetectorSettings, HitBatch};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Settings for opening a capture on the detector's private LAN.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Capture device name, as listed by [`list_interfaces`].
    pub interface: String,
    /// MAC address of the detector board.
    pub source_mac: [u8; 6],
    /// UDP source port of the detector board.
    pub udp_port: u16,
    /// Snapshot length in bytes.
    pub snaplen: i32,
    /// Read timeout in milliseconds; bounds how long `stop` waits.
    pub timeout_ms: i32,
    /// Kernel buffer size in bytes.
    pub buffer_size: i32,
}

impl CaptureConfig {
    /// Capture on `interface` for the source configured in `settings`.
    ///
    /// # Errors
    /// Returns an error if the configured MAC address is malformed.
    pub fn from_settings(interface: &str, settings: &DetectorSettings) -> Result<Self> {
        Ok(Self {
            interface: interface.to_string(),
            source_mac: settings.mac_address()?,
            udp_port: settings.udp_port,
            snaplen: 65535,
            timeout_ms: 100,
            buffer_size: 64 * 1024 * 1024,
        })
    }

    /// BPF expression selecting IPv4/UDP traffic from the detector board.
    ///
    /// Ports are checked by the decoder rather than the filter because only
    /// the first IP fragment carries the UDP header.
    #[must_use]
    pub fn filter(&self) -> String {
        let mac = self
            .source_mac
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":");
        format!("ether src {mac} and udp")
    }
}

/// Names and descriptions of the available capture devices.
///
/// # Errors
/// Returns an error if libpcap cannot enumerate devices.
pub fn list_interfaces() -> Result<Vec<(String, Option<String>)>> {
    Ok(Device::list()?
        .into_iter()
        .map(|d| (d.name, d.desc))
        .collect())
}

/// Decode every detector packet in a saved pcap file.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn read_capture_file<P: AsRef<Path>>(
    path: P,
    decoder: &mut PacketDecoder,
) -> Result<Vec<HitBatch>> {
    let mut capture = Capture::from_file(path)?;
    let mut batches = Vec::new();
    loop {
        match capture.next_packet() {
            Ok(packet) => batches.extend(decoder.decode(packet.data)),
            Err(pcap::Error::NoMorePackets) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(batches)
}

/// Packet source backed by a live pcap capture.
pub struct LiveCapture {
    config: CaptureConfig,
    queue: Arc<BatchQueue>,
    stats: Arc<DecodeStats>,
    running: Arc<AtomicBool>,
    decoder: Option<PacketDecoder>,
    handle: Option<JoinHandle<PacketDecoder>>,
}

impl LiveCapture {
    /// Creates a stopped capture pushing onto `queue`.
    #[must_use]
    pub fn new(config: CaptureConfig, queue: Arc<BatchQueue>) -> Self {
        let decoder = PacketDecoder::new(config.source_mac, config.udp_port);
        Self {
            stats: decoder.stats(),
            config,
            queue,
            running: Arc::new(AtomicBool::new(false)),
            decoder: Some(decoder),
            handle: None,
        }
    }

    fn open(&self) -> Result<Capture<Active>> {
        let device = Device::list()?
            .into_iter()
            .find(|d| d.name == self.config.interface)
            .ok_or_else(|| Error::InterfaceNotFound(self.config.interface.clone()))?;
        info!("opening capture on {}", device.name);

        let mut capture = Capture::from_device(device)?
            .snaplen(self.config.snaplen)
            .timeout(self.config.timeout_ms)
            .buffer_size(self.config.buffer_size)
            .immediate_mode(true)
            .open()?;
        let filter = self.config.filter();
        capture.filter(&filter, true)?;
        debug!("capture filter: {filter}");
        Ok(capture)
    }
}

fn capture_loop(
    mut capture: Capture<Active>,
    mut decoder: PacketDecoder,
    queue: &BatchQueue,
    running: &AtomicBool,
    interface: &str,
) -> PacketDecoder {
    while running.load(Ordering::Acquire) {
        match capture.next_packet() {
            Ok(packet) => {
                if let Some(batch) = decoder.decode(packet.data) {
                    queue.push(batch);
                }
            }
            Err(pcap::Error::TimeoutExpired) => {}
            Err(e) => {
                error!("capture on {interface} stopped: {e}");
                break;
            }
        }
    }
    running.store(false, Ordering::Release);
    decoder
}

impl HitSource for LiveCapture {
    fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(Error::AlreadyRunning);
        }
        let capture = self.open()?;
        let decoder = self.decoder.take().ok_or(Error::AlreadyRunning)?;
        let queue = Arc::clone(&self.queue);
        let running = Arc::clone(&self.running);
        let interface = self.config.interface.clone();
        running.store(true, Ordering::Release);

        let handle = thread::Builder::new()
            .name("speem-capture".into())
            .spawn(move || capture_loop(capture, decoder, &queue, &running, &interface))?;
        self.handle = Some(handle);
        info!("capture started on {}", self.config.interface);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let decoder = handle
                .join()
                .map_err(|_| Error::Thread("capture thread panicked".into()))?;
            self.decoder = Some(decoder);
            info!("capture stopped on {}", self.config.interface);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn queue(&self) -> &Arc<BatchQueue> {
        &self.queue
    }

    fn decode_stats(&self) -> Arc<DecodeStats> {
        Arc::clone(&self.stats)
    }
}

impl Drop for LiveCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_expression() {
        let config = CaptureConfig::from_settings("eth1", &DetectorSettings::default()).unwrap();
        assert_eq!(config.filter(), "ether src 00:0a:35:01:02:03 and udp");
        assert_eq!(config.udp_port, 60000);
    }
}
