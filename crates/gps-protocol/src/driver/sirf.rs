//! SiRF binary driver
//!
//! # Frame Format
//! ```text
//! A0 A2 [len:2 BE] [id] [data...] [cksum:2 BE] B0 B3
//! ```
//!
//! The checksum is the 15-bit sum of the payload bytes. SiRF chips start in
//! NMEA mode and reveal themselves through `$PSRF` sentences.

use super::{nmea, ControlSender, Driver, ModeSwitcher, RateSwitcher, SpeedSwitcher};
use crate::{LineSettings, Packet, Parity, Protocol, WireMode};

pub const SYNC1: u8 = 0xA0;
pub const SYNC2: u8 = 0xA2;
pub const END1: u8 = 0xB0;
pub const END2: u8 = 0xB3;

/// Software version string (output)
const MID_SW_VERSION: u8 = 0x06;
/// Switch to NMEA protocol (input)
const MID_SWITCH_TO_NMEA: u8 = 0x81;
/// Set binary serial port (input)
const MID_SET_SERIAL_PORT: u8 = 0x86;
/// Set message rate (input)
const MID_SET_MESSAGE_RATE: u8 = 0xA6;

/// Longest payload the length field can carry
const MAX_PAYLOAD: usize = 0x7FFF;

/// Rates the chip's UART accepts
const SUPPORTED_RATES: &[u32] = &[1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// 15-bit additive checksum over the payload
pub fn checksum(payload: &[u8]) -> u16 {
    payload
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
        & 0x7FFF
}

/// Wrap a payload (message id first) in SiRF framing
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u16;
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend_from_slice(&[SYNC1, SYNC2]);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&checksum(payload).to_be_bytes());
    out.extend_from_slice(&[END1, END2]);
    out
}

fn parity_code(parity: Parity) -> u8 {
    match parity {
        Parity::None => 0,
        Parity::Odd => 1,
        Parity::Even => 2,
    }
}

/// SiRF-family receivers
#[derive(Debug, Clone, Copy, Default)]
pub struct Sirf;

impl Driver for Sirf {
    fn type_name(&self) -> &'static str {
        "SiRF"
    }

    fn protocol(&self) -> Protocol {
        Protocol::Sirf
    }

    fn is_triggered_by(&self, sentence: &[u8]) -> bool {
        sentence.starts_with(b"$PSRF")
    }

    fn subtype_from(&self, packet: &Packet) -> Option<String> {
        if packet.protocol != Protocol::Sirf {
            return None;
        }
        match packet.payload() {
            [MID_SW_VERSION, version @ ..] => {
                let end = version.iter().position(|&b| b == 0).unwrap_or(version.len());
                let text = String::from_utf8_lossy(&version[..end]).trim().to_string();
                (!text.is_empty()).then_some(text)
            }
            _ => None,
        }
    }

    fn mode_switcher(&self) -> Option<&dyn ModeSwitcher> {
        Some(self)
    }

    fn speed_switcher(&self) -> Option<&dyn SpeedSwitcher> {
        Some(self)
    }

    fn rate_switcher(&self) -> Option<&dyn RateSwitcher> {
        Some(self)
    }

    fn control_sender(&self) -> Option<&dyn ControlSender> {
        Some(self)
    }
}

impl ModeSwitcher for Sirf {
    fn mode_switch(&self, mode: WireMode, line: LineSettings) -> Vec<u8> {
        match mode {
            WireMode::Nmea => {
                // The NMEA switch message only carries a 16-bit rate
                let baud = u16::try_from(line.baud_rate).unwrap_or(38400);
                let mut payload = vec![MID_SWITCH_TO_NMEA, 0x02];
                // (rate, checksum-enable) for GGA GLL GSA GSV RMC VTG MSS EPE ZDA
                for rate in [1, 0, 1, 5, 1, 0, 0, 0, 0] {
                    payload.extend_from_slice(&[rate, 0x01]);
                }
                payload.extend_from_slice(&[0x00, 0x00]);
                payload.extend_from_slice(&baud.to_be_bytes());
                frame(&payload)
            }
            WireMode::Binary => nmea::frame(&format!(
                "PSRF100,0,{},8,{},{}",
                line.baud_rate,
                line.stop_bits.count(),
                parity_code(line.parity)
            )),
        }
    }
}

impl SpeedSwitcher for Sirf {
    fn speed_switch(&self, target: LineSettings) -> Option<Vec<u8>> {
        if !SUPPORTED_RATES.contains(&target.baud_rate) {
            return None;
        }
        let mut payload = vec![MID_SET_SERIAL_PORT];
        payload.extend_from_slice(&target.baud_rate.to_be_bytes());
        payload.extend_from_slice(&[
            8,
            target.stop_bits.count(),
            parity_code(target.parity),
            0,
        ]);
        Some(frame(&payload))
    }
}

impl RateSwitcher for Sirf {
    fn rate_switch(&self, cycle_secs: f64) -> Option<Vec<u8>> {
        // Whole seconds only, 1..=30
        if cycle_secs.fract() != 0.0 || !(1.0..=30.0).contains(&cycle_secs) {
            return None;
        }
        let rate = cycle_secs as u8;
        Some(frame(&[MID_SET_MESSAGE_RATE, 0x02, 0x00, rate, 0, 0, 0, 0]))
    }
}

impl ControlSender for Sirf {
    fn control_frame(&self, raw: &[u8]) -> Option<Vec<u8>> {
        if raw.is_empty() || raw.len() > MAX_PAYLOAD {
            return None;
        }
        Some(frame(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StopBits;

    #[test]
    fn test_frame_layout() {
        let framed = frame(&[0x84, 0x00]);
        assert_eq!(framed, vec![0xA0, 0xA2, 0x00, 0x02, 0x84, 0x00, 0x00, 0x84, 0xB0, 0xB3]);
    }

    #[test]
    fn test_to_binary_is_psrf100() {
        let bytes = Sirf.mode_switch(WireMode::Binary, LineSettings::n81(4800));
        assert_eq!(bytes, b"$PSRF100,0,4800,8,1,0*0F\r\n");
    }

    #[test]
    fn test_to_nmea_is_binary_message() {
        let bytes = Sirf.mode_switch(WireMode::Nmea, LineSettings::n81(4800));
        assert_eq!(&bytes[..2], &[SYNC1, SYNC2]);
        assert_eq!(bytes[4], MID_SWITCH_TO_NMEA);
        // 24-byte payload ending in the rate
        assert_eq!(&bytes[2..4], &[0x00, 0x18]);
        assert_eq!(&bytes[26..28], &4800u16.to_be_bytes());
    }

    #[test]
    fn test_speed_switch() {
        let target = LineSettings::new(9600, Parity::Even, StopBits::Two);
        let bytes = Sirf.speed_switch(target).unwrap();
        assert_eq!(bytes[4], MID_SET_SERIAL_PORT);
        assert_eq!(&bytes[5..9], &9600u32.to_be_bytes());
        assert_eq!(&bytes[9..12], &[8, 2, 2]);

        assert!(Sirf.speed_switch(LineSettings::n81(12345)).is_none());
    }

    #[test]
    fn test_rate_switch_range() {
        assert!(Sirf.rate_switch(1.0).is_some());
        assert!(Sirf.rate_switch(0.5).is_none());
        assert!(Sirf.rate_switch(31.0).is_none());
    }

    #[test]
    fn test_subtype_from_version_message() {
        let packet = Packet {
            protocol: Protocol::Sirf,
            bytes: frame(b"\x06GSW3.2.4_3.1.00.12-SDK003P1.00a\0\0"),
        };
        assert_eq!(
            Sirf.subtype_from(&packet).as_deref(),
            Some("GSW3.2.4_3.1.00.12-SDK003P1.00a")
        );
    }

    #[test]
    fn test_triggered_by_psrf() {
        assert!(Sirf.is_triggered_by(b"$PSRFTXT,Version:GSW3.2.4*1A\r\n"));
        assert!(!Sirf.is_triggered_by(b"$GPGGA,,,,*66\r\n"));
    }
}
