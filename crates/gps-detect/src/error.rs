//! Error types for receiver detection

use thiserror::Error;

/// Errors that can occur while opening or hunting a device
#[derive(Debug, Error)]
pub enum DetectError {
    /// Failed to open the device
    #[error("failed to open {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    /// I/O error while waiting on or reading the device
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The device reported an error or disappeared
    #[error("device error on {path}: {reason}")]
    Device { path: String, reason: String },

    /// No sync was reached before the deadline
    #[error("packet recognition timed out after {seconds} seconds")]
    TimedOut { seconds: u64 },

    /// Serial port error
    #[error("serial port error: {0}")]
    SerialPort(#[from] serialport::Error),
}
