//! Daemon command/response protocol
//!
//! Commands are single text lines such as `?DEVICES;` or
//! `?DEVICE={"path":"/dev/ttyUSB0","native":1}`. Every response is one JSON
//! object tagged by its `class` member.

pub mod client;
pub mod response;

pub use client::{DaemonClient, QUERY_POLL_INTERVAL};
pub use response::{DeviceReport, Expect, Response, ResponseMask};

use serde::Serialize;

use crate::error::DaemonError;

/// Request the device list
pub const DEVICES_COMMAND: &str = "?DEVICES;";

/// Subscribe to JSON reports
pub const WATCH_COMMAND: &str = r#"?WATCH={"enable":true,"json":true};"#;

/// Body of a `?DEVICE=` command; unset members are omitted
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceCommand<'a> {
    pub path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopbits: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle: Option<f64>,
}

impl<'a> DeviceCommand<'a> {
    pub fn new(path: &'a str) -> Self {
        Self {
            path,
            ..Default::default()
        }
    }

    /// Render as a command line
    pub fn render(&self) -> Result<String, DaemonError> {
        Ok(format!("?DEVICE={}", serde_json::to_string(self)?))
    }
}
