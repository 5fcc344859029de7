//! Process-wide settings
//!
//! A [`Context`] is built once at startup and handed by value to each
//! component; nothing reads ambient global state.

use std::time::Duration;

use gps_detect::hunter::DEFAULT_BAUD_RATES;
use gps_detect::HuntConfig;
use serde::{Deserialize, Serialize};

/// Settings shared by every component of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Context {
    /// Debug verbosity (`-D`)
    pub debug: u8,
    /// Suppress writes to the device
    pub read_only: bool,
    /// Overall operation timeout in seconds
    pub timeout: u64,
    /// Baud ladder used when hunting
    pub baud_rates: Vec<u32>,
    pub daemon_host: String,
    pub daemon_port: u16,
    /// Time without a recognized packet before the hunter changes rate
    pub hunt_window_ms: u64,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            debug: 0,
            read_only: false,
            timeout: 8,
            baud_rates: DEFAULT_BAUD_RATES.to_vec(),
            daemon_host: "127.0.0.1".to_string(),
            daemon_port: 2947,
            hunt_window_ms: 1500,
        }
    }
}

impl Context {
    /// Hunting parameters derived from these settings
    pub fn hunt_config(&self) -> HuntConfig {
        HuntConfig {
            timeout: Duration::from_secs(self.timeout),
            hunt_window: Duration::from_millis(self.hunt_window_ms),
            baud_rates: self.baud_rates.clone(),
            ..Default::default()
        }
    }

    pub fn daemon_addr(&self) -> String {
        format!("{}:{}", self.daemon_host, self.daemon_port)
    }

    /// First rate of the ladder, where hunting starts
    pub fn initial_baud(&self) -> u32 {
        self.baud_rates.first().copied().unwrap_or(4800)
    }
}
