//! speem-etherdaq: EtherDAQ detector acquisition.
//!
//! This crate decodes the UDP datagrams sent by the detector's FPGA board,
//! runs packet sources on background threads, and assembles the decoded
//! batches into frames on a tokio runtime.
//!
//! # Pipeline
//!
//! ```text
//! LiveCapture / SyntheticSource -> PacketDecoder -> BatchQueue
//!     -> FrameAssembler -> CoordinateConverter -> subscribers
//! ```
//!
//! Live capture needs libpcap and is enabled with the `live-capture` feature.

pub mod assembler;
#[cfg(feature = "live-capture")]
pub mod capture;
pub mod driver;
pub mod encode;
pub mod error;
pub mod packet;
pub mod queue;
pub mod source;
pub mod wire;

pub use assembler::FrameAssembler;
#[cfg(feature = "live-capture")]
pub use capture::{list_interfaces, read_capture_file, CaptureConfig, LiveCapture};
pub use driver::EtherDaqDriver;
pub use encode::{encode_event, encode_frame, encode_payload, EventRecord};
pub use error::{Error, Result};
pub use packet::{DecodeCounts, DecodeStats, EventOrder, PacketDecoder};
pub use queue::BatchQueue;
pub use source::{HitSource, SyntheticConfig, SyntheticGenerator, SyntheticSource};
