//! What is known about the target device

use gps_detect::HuntOutcome;
use gps_protocol::{LineSettings, Parity, StopBits};
use serde::{Deserialize, Serialize};

/// Identity and line state of the device under control
///
/// An empty `driver` means the device is not identified yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub path: String,
    pub baud_rate: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub driver: String,
    pub subtype: String,
}

impl DeviceDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn is_identified(&self) -> bool {
        !self.driver.is_empty()
    }

    /// Driver name followed by the subtype, if any
    pub fn id_string(&self) -> String {
        match (self.driver.is_empty(), self.subtype.is_empty()) {
            (true, _) => "unknown,".to_string(),
            (false, true) => self.driver.clone(),
            (false, false) => format!("{} {}", self.driver, self.subtype),
        }
    }

    pub fn line(&self) -> LineSettings {
        LineSettings::new(self.baud_rate, self.parity, self.stop_bits)
    }

    pub fn set_line(&mut self, line: LineSettings) {
        self.baud_rate = line.baud_rate;
        self.parity = line.parity;
        self.stop_bits = line.stop_bits;
    }

    /// Record the result of a hunt
    pub fn apply_hunt(&mut self, outcome: &HuntOutcome) {
        self.set_line(outcome.line);
        self.driver = outcome.driver.type_name().to_string();
        self.subtype = outcome.subtype.clone();
    }
}
