//! EtherDAQ error types.

use thiserror::Error;

/// Result type for EtherDAQ operations.
pub type Result<T> = std::result::Result<T, Error>;

/// EtherDAQ error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Packet capture error.
    #[cfg(feature = "live-capture")]
    #[error("capture error: {0}")]
    Capture(#[from] pcap::Error),

    /// No capture device with the requested name.
    #[error("capture interface not found: {0}")]
    InterfaceNotFound(String),

    /// `start` called on a source that is already running.
    #[error("packet source is already running")]
    AlreadyRunning,

    /// The background capture thread could not be spawned or joined.
    #[error("capture thread error: {0}")]
    Thread(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] speem_core::Error),
}
