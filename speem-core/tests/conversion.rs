//! Settings and calibration files driving the coordinate converter.

use approx::assert_relative_eq;
use speem_core::{CalibrationModel, CoordinateConverter, DetectorSettings, Error, RawFrame};
use std::io::Write;

fn write_json(dir: &tempfile::TempDir, name: &str, json: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(json.as_bytes()).unwrap();
    path
}

#[test]
fn test_converter_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let settings_path = write_json(
        &dir,
        "detector.json",
        r#"{"bins_per_channel": 2048, "data_reduction": 4, "timing_delay": 500.0}"#,
    );
    let calibration_path = write_json(&dir, "18ns.json", r#"{"offset": 120.0, "slope": 0.05}"#);

    let settings = DetectorSettings::from_file(&settings_path).unwrap();
    let calibration = CalibrationModel::from_file(&calibration_path).unwrap();
    let converter = CoordinateConverter::new(&settings, calibration);

    assert_eq!(converter.data_size(), 512);
    assert_eq!(converter.t_bins().len(), 513);
    assert_relative_eq!(converter.bin_to_time(0.0), 380.0);
    assert_relative_eq!(converter.bin_to_time(2048.0), 380.0 - 102.4);
    assert!(converter.bin_to_time(0.0) > converter.bin_to_time(2048.0));
    assert!(converter.t_bins().windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_convert_is_deterministic() {
    let settings = DetectorSettings::default();
    let converter = CoordinateConverter::new(&settings, CalibrationModel::new(10.0, 0.3).unwrap());
    let raw = RawFrame::from_array(ndarray::array![[0, 4095, 17], [2048, 2048, 4000]]).unwrap();

    let first = converter.convert(&raw);
    let second = converter.convert(&raw);
    assert_eq!(first, second);

    let (low, high) = converter.time_range();
    assert!(first.column(2).iter().all(|t| (low..=high).contains(t)));
}

#[test]
fn test_bad_calibration_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_json(&dir, "bad.json", r#"{"offset": 1.0, "slope": 0.0}"#);
    assert!(matches!(
        CalibrationModel::from_file(&path),
        Err(Error::CalibrationLoad { .. })
    ));
}
