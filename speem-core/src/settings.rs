//! Detector and acquisition settings.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::ops::RangeInclusive;
use std::path::Path;

/// Accepted frame times in seconds.
pub const FRAME_TIME_RANGE: RangeInclusive<f64> = 0.1..=10.0;

/// Accepted count-rate averaging times in seconds.
pub const AVERAGING_TIME_RANGE: RangeInclusive<f64> = 0.5..=1000.0;

/// Accepted timing delays in nanoseconds.
pub const TIMING_DELAY_RANGE: RangeInclusive<f64> = 0.0..=3000.0;

/// Settings for the detector, the acquisition loop and the live histograms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Raw bins per detector channel (x, y and t share the same range).
    pub bins_per_channel: u16,
    /// Raw bins merged into one histogram bin.
    pub data_reduction: u16,
    /// Active detector diameter in millimetres.
    pub detector_diameter_mm: f64,
    /// Half-width of the spatial histogram axes in millimetres.
    pub xy_extent_mm: f64,
    /// Integration time of one frame in seconds.
    pub frame_time: f64,
    /// Count-rate averaging interval in seconds.
    pub averaging_time: f64,
    /// Initial timing delay in nanoseconds.
    pub timing_delay: f64,
    /// MAC address of the detector FPGA board.
    pub source_mac: String,
    /// UDP source port used by the detector.
    pub udp_port: u16,
    /// Maximum number of batches held between frame reads.
    pub queue_capacity: usize,
    /// Quiet period before a marginal is recomputed after a window change.
    pub recompute_debounce_ms: u64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            bins_per_channel: 4096,
            data_reduction: 8,
            detector_diameter_mm: 24.0,
            xy_extent_mm: 13.0,
            frame_time: 0.5,
            averaging_time: 5.0,
            timing_delay: 0.0,
            source_mac: "00:0a:35:01:02:03".to_string(),
            udp_port: 60000,
            queue_capacity: 4096,
            recompute_debounce_ms: 200,
        }
    }
}

impl DetectorSettings {
    /// Load settings from a JSON file.
    ///
    /// Missing fields keep their defaults. The result is validated.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let settings: Self = serde_json::from_reader(BufReader::new(file))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the string cannot be parsed or validated.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that the settings describe a usable detector.
    ///
    /// # Errors
    /// Returns a configuration error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.bins_per_channel == 0 {
            return Err(Error::ConfigError("bins_per_channel must be > 0".into()));
        }
        if self.data_reduction == 0 || self.data_size() == 0 {
            return Err(Error::ConfigError(format!(
                "data_reduction {} leaves no histogram bins for {} raw bins",
                self.data_reduction, self.bins_per_channel
            )));
        }
        if !(self.detector_diameter_mm.is_finite() && self.detector_diameter_mm > 0.0) {
            return Err(Error::ConfigError(
                "detector_diameter_mm must be positive".into(),
            ));
        }
        if !(self.xy_extent_mm.is_finite() && self.xy_extent_mm > 0.0) {
            return Err(Error::ConfigError("xy_extent_mm must be positive".into()));
        }
        if !TIMING_DELAY_RANGE.contains(&self.timing_delay) {
            return Err(Error::ConfigError(format!(
                "timing_delay {} ns outside {:?}",
                self.timing_delay, TIMING_DELAY_RANGE
            )));
        }
        if self.queue_capacity == 0 {
            return Err(Error::ConfigError("queue_capacity must be > 0".into()));
        }
        self.mac_address()?;
        Ok(())
    }

    /// Number of histogram bins per axis.
    #[must_use]
    pub fn data_size(&self) -> usize {
        usize::from(self.bins_per_channel / self.data_reduction.max(1))
    }

    /// Millimetres spanned by one raw position bin.
    #[must_use]
    pub fn mm_per_bin(&self) -> f64 {
        self.detector_diameter_mm / f64::from(self.bins_per_channel)
    }

    /// Parse `source_mac` into bytes.
    ///
    /// # Errors
    /// Returns an error unless the address is six colon-separated hex octets.
    pub fn mac_address(&self) -> Result<[u8; 6]> {
        parse_mac(&self.source_mac)
    }
}

/// Parse a MAC address written as `aa:bb:cc:dd:ee:ff`.
///
/// # Errors
/// Returns a configuration error for anything else.
pub fn parse_mac(text: &str) -> Result<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = text.split(':');
    for octet in &mut mac {
        let part = parts
            .next()
            .ok_or_else(|| Error::ConfigError(format!("MAC address too short: {text}")))?;
        *octet = u8::from_str_radix(part, 16)
            .map_err(|_| Error::ConfigError(format!("invalid MAC octet {part:?} in {text}")))?;
    }
    if parts.next().is_some() {
        return Err(Error::ConfigError(format!("MAC address too long: {text}")));
    }
    Ok(mac)
}

/// Clamp a requested frame time into [`FRAME_TIME_RANGE`].
#[must_use]
pub fn clamp_frame_time(seconds: f64) -> f64 {
    clamp_to(seconds, &FRAME_TIME_RANGE)
}

/// Clamp a requested averaging time into [`AVERAGING_TIME_RANGE`].
#[must_use]
pub fn clamp_averaging_time(seconds: f64) -> f64 {
    clamp_to(seconds, &AVERAGING_TIME_RANGE)
}

/// Clamp a requested timing delay into [`TIMING_DELAY_RANGE`]. NaN maps to
/// zero delay.
#[must_use]
pub fn clamp_timing_delay(nanoseconds: f64) -> f64 {
    clamp_to(nanoseconds, &TIMING_DELAY_RANGE)
}

fn clamp_to(value: f64, range: &RangeInclusive<f64>) -> f64 {
    if value.is_nan() {
        return *range.start();
    }
    value.clamp(*range.start(), *range.end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = DetectorSettings::default();
        assert_eq!(settings.data_size(), 512);
        assert!(settings.validate().is_ok());
        assert_eq!(settings.mac_address().unwrap(), [0x00, 0x0a, 0x35, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_json_partial() {
        let settings = DetectorSettings::from_json(r#"{ "data_reduction": 16 }"#).unwrap();
        assert_eq!(settings.data_size(), 256);
        assert_eq!(settings.udp_port, 60000);
    }

    #[test]
    fn test_json_rejects_zero_reduction() {
        let err = DetectorSettings::from_json(r#"{ "data_reduction": 0 }"#).unwrap_err();
        assert!(err.to_string().contains("data_reduction"));
    }

    #[test]
    fn test_parse_mac() {
        assert_eq!(parse_mac("ff:00:10:ab:CD:01").unwrap(), [0xff, 0, 0x10, 0xab, 0xcd, 1]);
        assert!(parse_mac("ff:00:10:ab:cd").is_err());
        assert!(parse_mac("ff:00:10:ab:cd:01:02").is_err());
        assert!(parse_mac("zz:00:10:ab:cd:01").is_err());
    }

    #[test]
    fn test_clamps() {
        assert_eq!(clamp_frame_time(0.01), 0.1);
        assert_eq!(clamp_frame_time(2.0), 2.0);
        assert_eq!(clamp_frame_time(60.0), 10.0);
        assert_eq!(clamp_averaging_time(0.0), 0.5);
        assert_eq!(clamp_averaging_time(5000.0), 1000.0);
        assert_eq!(clamp_averaging_time(f64::NAN), 0.5);
        assert_eq!(clamp_timing_delay(-1e9), 0.0);
        assert_eq!(clamp_timing_delay(f64::NAN), 0.0);
        assert_eq!(clamp_timing_delay(250.5), 250.5);
        assert_eq!(clamp_timing_delay(1e6), 3000.0);
    }

    #[test]
    fn test_timing_delay_out_of_range_rejected() {
        let err = DetectorSettings::from_json(r#"{ "timing_delay": -5.0 }"#).unwrap_err();
        assert!(err.to_string().contains("timing_delay"));
        assert!(DetectorSettings::from_json(r#"{ "timing_delay": 3000.0 }"#).is_ok());
    }
}
