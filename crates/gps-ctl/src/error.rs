//! Error types for receiver control

use std::fmt;

use gps_detect::DetectError;
use thiserror::Error;

/// A write-class driver capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ModeSwitch,
    SpeedSwitch,
    RateSwitch,
    ControlSend,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::ModeSwitch => "mode switch",
            Operation::SpeedSwitch => "speed switch",
            Operation::RateSwitch => "rate switcher",
            Operation::ControlSend => "control sender",
        })
    }
}

/// Errors from the daemon query client
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Could not reach the daemon
    #[error("no daemon running or network error at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Shipping the command failed
    #[error("query write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// The daemon answered with an error response
    #[error("error '{message}'")]
    Rejected { message: String },

    /// No acceptable response before the deadline
    #[error("no response within {seconds} seconds")]
    TimedOut { seconds: u64 },

    /// Waiting on the connection failed
    #[error("wait failed: {0}")]
    Wait(#[source] std::io::Error),

    /// The daemon hung up
    #[error("daemon closed the connection")]
    Closed,

    /// A command could not be encoded
    #[error("command encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DaemonError {
    /// Whether the connection itself is unusable
    pub fn is_fatal(&self) -> bool {
        matches!(self, DaemonError::Wait(_) | DaemonError::Closed)
    }
}

/// Errors that can occur while controlling a receiver
#[derive(Debug, Error)]
pub enum CtlError {
    /// Conflicting or missing arguments; reported before any I/O
    #[error("{0}")]
    User(String),

    /// The daemon or the driver refused or never confirmed an operation
    #[error("{0}")]
    Protocol(String),

    /// Daemon query failure
    #[error(transparent)]
    Daemon(#[from] DaemonError),

    /// Opening or hunting the device failed
    #[error(transparent)]
    Detect(#[from] DetectError),

    /// Writing to or draining the device failed
    #[error("I/O error on {path}: {source}")]
    Device {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The bound driver lacks the requested capability
    #[error("{driver} devices have no {operation}")]
    Capability {
        driver: &'static str,
        operation: Operation,
    },

    /// A write was attempted while the session is read-only
    #[error("write refused on read-only session")]
    ReadOnly,

    /// Interrupted by a signal
    #[error("killed by signal {0}")]
    Cancelled(i32),
}

impl CtlError {
    /// Whether the process must stop without further I/O
    pub fn is_fatal(&self) -> bool {
        match self {
            CtlError::Detect(_) | CtlError::Device { .. } | CtlError::Cancelled(_) => true,
            CtlError::Daemon(e) => e.is_fatal(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_message() {
        let err = CtlError::Capability {
            driver: "Generic NMEA",
            operation: Operation::ModeSwitch,
        };
        assert_eq!(err.to_string(), "Generic NMEA devices have no mode switch");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(CtlError::Detect(DetectError::TimedOut { seconds: 8 }).is_fatal());
        assert!(CtlError::Daemon(DaemonError::Closed).is_fatal());
        assert!(!CtlError::Daemon(DaemonError::TimedOut { seconds: 8 }).is_fatal());
        assert!(!CtlError::User("make up your mind".into()).is_fatal());
    }
}
