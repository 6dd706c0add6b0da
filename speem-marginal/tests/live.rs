//! Driver frames flowing into the live monitor.

use approx::assert_relative_eq;
use speem_core::{CalibrationModel, DetectorSettings};
use speem_etherdaq::{
    BatchQueue, EtherDaqDriver, SyntheticConfig, SyntheticGenerator, SyntheticSource,
};
use speem_marginal::{AccumulationMode, Axis, LiveMonitor};
use std::sync::Arc;

fn settings() -> DetectorSettings {
    DetectorSettings {
        bins_per_channel: 1024,
        data_reduction: 16,
        detector_diameter_mm: 24.0,
        xy_extent_mm: 13.0,
        frame_time: 0.5,
        ..DetectorSettings::default()
    }
}

fn generator(seed: u64) -> SyntheticGenerator {
    SyntheticGenerator::new(SyntheticConfig {
        events_per_packet: 50..=50,
        bins_per_channel: 1024,
        seed,
        ..SyntheticConfig::default()
    })
}

fn driver(queue: &Arc<BatchQueue>) -> EtherDaqDriver {
    let source = SyntheticSource::new(SyntheticConfig::default(), Arc::clone(queue));
    EtherDaqDriver::new(
        Box::new(source),
        &settings(),
        CalibrationModel::new(0.0, 0.1).unwrap(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_subscribed_monitor_sees_every_frame() {
    let queue = Arc::new(BatchQueue::default());
    let driver = driver(&queue);
    let monitor = Arc::new(LiveMonitor::from_converter(driver.converter(), &settings()).unwrap());
    monitor.set_mode(AccumulationMode::Accumulate);

    let listener = {
        let monitor = Arc::clone(&monitor);
        let frames = driver.subscribe();
        let edges = driver.subscribe_time_edges();
        tokio::spawn(async move { monitor.run(frames, edges).await })
    };

    let mut generator = generator(1);
    for _ in 0..4 {
        for _ in 0..3 {
            queue.push(generator.next_batch().unwrap());
        }
        let frame = driver.read_frame().await;
        assert_eq!(frame.len(), 150);
    }
    drop(driver);
    listener.await.unwrap();

    assert_eq!(monitor.snapshot().total_events, 600);
    // Every synthetic hit lies inside the histogram ranges.
    assert_relative_eq!(monitor.get_marginal(Axis::T).total(), 600.0);
    assert_relative_eq!(monitor.get_1d_projection(Axis::T).sum(), 600.0);
    assert_eq!(monitor.with_accumulator(|acc| acc.retained_frames()), 4);
}

#[tokio::test(start_paused = true)]
async fn test_timing_delay_reaches_subscribed_monitor() {
    let queue = Arc::new(BatchQueue::default());
    let mut driver = driver(&queue);
    let monitor = Arc::new(LiveMonitor::from_converter(driver.converter(), &settings()).unwrap());
    let listener = {
        let monitor = Arc::clone(&monitor);
        let (frames, edges) = (driver.subscribe(), driver.subscribe_time_edges());
        tokio::spawn(async move { monitor.run(frames, edges).await })
    };

    let mut generator = generator(2);
    queue.push(generator.next_batch().unwrap());
    driver.read_frame().await;
    tokio::task::yield_now().await;
    let counts = monitor.get_marginal(Axis::X).counts().to_owned();
    assert_relative_eq!(counts.sum(), 50.0);

    assert_relative_eq!(driver.set_timing_delay(25.0), 25.0);
    let t_bins = driver.converter().t_bins().to_vec();
    drop(driver);
    listener.await.unwrap();

    let marginal = monitor.get_marginal(Axis::X);
    assert_eq!(marginal.counts(), counts);
    assert_eq!(marginal.col_edges(), t_bins.as_slice());
    assert_eq!(monitor.get_marginal(Axis::Y).col_edges(), t_bins.as_slice());
}
