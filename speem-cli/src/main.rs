//! SPEEM command line interface.
//!
//! Runs the detector pipeline against synthetic packets or, with the
//! `live-capture` feature, against the detector's network interface.

use clap::{Args, Parser, Subcommand};
use log::{debug, info, warn, LevelFilter};
use speem_core::{CalibrationModel, DetectorSettings, Frame};
use speem_etherdaq::{
    BatchQueue, EtherDaqDriver, HitSource, SyntheticConfig, SyntheticSource,
};
use speem_marginal::{AccumulationMode, Axis, LiveMonitor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("Core error: {0}")]
    Core(#[from] speem_core::Error),

    #[error("Acquisition error: {0}")]
    Daq(#[from] speem_etherdaq::Error),

    #[error("Histogram error: {0}")]
    Marginal(#[from] speem_marginal::Error),

    #[error("{0}")]
    Usage(String),
}

/// Offset and slope used by `simulate` when no calibration file is given.
const NOMINAL_CALIBRATION: (f64, f64) = (0.0, 0.025);

/// Photoemission electron spectrometer detector pipeline.
#[derive(Parser)]
#[command(name = "speem")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Detector settings (JSON)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Timing calibration with `offset` and `slope` (JSON)
    #[arg(long, global = true)]
    calibration: Option<PathBuf>,

    /// Frame integration time in seconds
    #[arg(long, global = true)]
    frame_time: Option<f64>,

    /// Timing delay in nanoseconds
    #[arg(long, global = true)]
    timing_delay: Option<f64>,

    /// Accumulate marginals instead of showing the latest frame only
    #[arg(long, global = true)]
    accumulate: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline on synthetic packets
    Simulate {
        /// Number of frames to read
        #[arg(short = 'n', long, default_value = "10")]
        frames: usize,

        /// Minimum events per packet
        #[arg(long, default_value = "100")]
        min_events: usize,

        /// Maximum events per packet
        #[arg(long, default_value = "1000")]
        max_events: usize,

        /// Milliseconds between packets
        #[arg(long, default_value = "10")]
        interval_ms: u64,

        /// Probability of a hardware half-record swap per event
        #[arg(long, default_value = "0.0")]
        swap_probability: f64,

        /// RNG seed
        #[arg(long, default_value = "24291")]
        seed: u64,
    },

    /// Acquire frames from the detector network interface
    #[cfg(feature = "live-capture")]
    Capture {
        /// Capture interface name
        interface: String,

        /// Number of frames to read
        #[arg(short = 'n', long, default_value = "10")]
        frames: usize,
    },

    /// Decode a saved pcap file and print decode statistics
    #[cfg(feature = "live-capture")]
    Decode {
        /// Input pcap file
        input: PathBuf,
    },

    /// List capture interfaces
    #[cfg(feature = "live-capture")]
    Interfaces,
}

fn load_settings(common: &CommonArgs) -> Result<DetectorSettings> {
    let mut settings = match &common.settings {
        Some(path) => DetectorSettings::from_file(path)?,
        None => DetectorSettings::default(),
    };
    if let Some(frame_time) = common.frame_time {
        settings.frame_time = frame_time;
    }
    if let Some(timing_delay) = common.timing_delay {
        settings.timing_delay = timing_delay;
    }
    settings.validate()?;
    Ok(settings)
}

fn load_calibration(common: &CommonArgs, required: bool) -> Result<CalibrationModel> {
    match &common.calibration {
        Some(path) => Ok(CalibrationModel::from_file(path)?),
        None if required => Err(CliError::Usage(
            "a timing calibration is required: pass --calibration <file>".into(),
        )),
        None => {
            let (offset, slope) = NOMINAL_CALIBRATION;
            warn!("no calibration given, using offset {offset} ns, slope {slope} ns/bin");
            Ok(CalibrationModel::new(offset, slope)?)
        }
    }
}

fn report(index: usize, frame: &Frame, driver: &EtherDaqDriver, monitor: &LiveMonitor) {
    let snapshot = monitor.snapshot();
    let rate = |r: Option<f64>| r.map_or_else(|| "-".to_string(), |r| format!("{r:.1}"));
    info!(
        "frame {index}: {} events, total {}, rate {} /s (start) {} /s (interval), windowed {}",
        frame.len(),
        snapshot.total_events,
        rate(snapshot.rate_since_start),
        rate(snapshot.rate_in_window),
        snapshot.windowed_events,
    );
    let counts = driver.decode_stats();
    debug!(
        "decode: {} packets, {} dropped, {} swapped, {} rejected, {} batches lost",
        counts.packets,
        counts.dropped_events,
        counts.swapped_events,
        counts.rejected_packets,
        driver.lost_batches()
    );
}

async fn acquire(
    source: Box<dyn HitSource>,
    settings: &DetectorSettings,
    calibration: CalibrationModel,
    accumulate: bool,
    frames: usize,
) -> Result<()> {
    let mut driver = EtherDaqDriver::new(source, settings, calibration);
    let monitor = LiveMonitor::from_converter(driver.converter(), settings)?;
    if accumulate {
        monitor.set_mode(AccumulationMode::Accumulate);
    }

    driver.start()?;
    for index in 0..frames {
        let frame = driver.read_frame().await;
        monitor.receive_frame(Arc::clone(&frame));
        report(index, &frame, &driver, &monitor);
    }
    driver.shutdown()?;

    let t_profile = monitor.get_1d_projection(Axis::T);
    let (low, high) = driver.converter().time_range();
    println!(
        "{} events in {frames} frames; time axis {low:.2}..{high:.2} ns, peak bin {}",
        monitor.snapshot().total_events,
        t_profile
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map_or(0, |(bin, _)| bin)
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.common.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Simulate {
            frames,
            min_events,
            max_events,
            interval_ms,
            swap_probability,
            seed,
        } => {
            let settings = load_settings(&cli.common)?;
            let calibration = load_calibration(&cli.common, false)?;
            let queue = Arc::new(BatchQueue::new(settings.queue_capacity));
            let source = SyntheticSource::new(
                SyntheticConfig {
                    events_per_packet: min_events..=max_events,
                    bins_per_channel: settings.bins_per_channel,
                    packet_interval: Duration::from_millis(interval_ms),
                    swap_probability,
                    corrupt_probability: 0.0,
                    seed,
                },
                queue,
            );
            acquire(
                Box::new(source),
                &settings,
                calibration,
                cli.common.accumulate,
                frames,
            )
            .await?;
        }

        #[cfg(feature = "live-capture")]
        Commands::Capture { interface, frames } => {
            let settings = load_settings(&cli.common)?;
            let calibration = load_calibration(&cli.common, true)?;
            let queue = Arc::new(BatchQueue::new(settings.queue_capacity));
            let config = speem_etherdaq::CaptureConfig::from_settings(&interface, &settings)?;
            let source = speem_etherdaq::LiveCapture::new(config, queue);
            acquire(
                Box::new(source),
                &settings,
                calibration,
                cli.common.accumulate,
                frames,
            )
            .await?;
        }

        #[cfg(feature = "live-capture")]
        Commands::Decode { input } => {
            let settings = load_settings(&cli.common)?;
            let mut decoder = speem_etherdaq::PacketDecoder::from_settings(&settings)?;
            let batches = speem_etherdaq::read_capture_file(&input, &mut decoder)?;
            let counts = decoder.stats().snapshot();
            println!("File: {}", input.display());
            println!("Batches: {}", batches.len());
            println!("Events: {}", counts.events);
            println!("Dropped events: {}", counts.dropped_events);
            println!("Swapped events: {}", counts.swapped_events);
            println!("Rejected packets: {}", counts.rejected_packets);
            if let (Some(first), Some(last)) = (batches.first(), batches.last()) {
                println!("Packet ids: {}..={}", first.packet_id, last.packet_id);
            }
        }

        #[cfg(feature = "live-capture")]
        Commands::Interfaces => {
            for (name, description) in speem_etherdaq::list_interfaces()? {
                match description {
                    Some(description) => println!("{name}\t{description}"),
                    None => println!("{name}"),
                }
            }
        }
    }

    Ok(())
}
