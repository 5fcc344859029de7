//! Generic NMEA 0183 driver
//!
//! The baseline every receiver is bound to before anything more specific is
//! recognized. It can frame raw control sentences but has no way to change
//! mode, speed or rate.

use super::{ControlSender, Driver};
use crate::Protocol;

/// XOR of all bytes between `$` and `*`
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0, |acc, b| acc ^ b)
}

/// Wrap a sentence body (no `$`, no `*hh`) as `$body*hh\r\n`
pub fn frame(body: &str) -> Vec<u8> {
    format!("${}*{:02X}\r\n", body, checksum(body.as_bytes())).into_bytes()
}

/// The vendor-neutral NMEA driver
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericNmea;

impl Driver for GenericNmea {
    fn type_name(&self) -> &'static str {
        "Generic NMEA"
    }

    fn protocol(&self) -> Protocol {
        Protocol::Nmea
    }

    fn control_sender(&self) -> Option<&dyn ControlSender> {
        Some(self)
    }
}

impl ControlSender for GenericNmea {
    fn control_frame(&self, raw: &[u8]) -> Option<Vec<u8>> {
        let body = raw.strip_prefix(b"$").unwrap_or(raw);
        let body = body.strip_suffix(b"\r\n").unwrap_or(body);
        if body.is_empty() || body.iter().any(|&b| !(0x20..0x7F).contains(&b)) {
            return None;
        }
        let body = std::str::from_utf8(body).ok()?;
        Some(frame(body))
    }
}
