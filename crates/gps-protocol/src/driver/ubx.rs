//! u-blox UBX driver
//!
//! # Frame Format
//! ```text
//! B5 62 [class] [id] [len:2 LE] [payload...] [ck_a] [ck_b]
//! ```
//!
//! The checksum is an 8-bit Fletcher sum over class, id, length and payload.

use super::{ControlSender, Driver, ModeSwitcher, RateSwitcher, SpeedSwitcher};
use crate::{LineSettings, Packet, Parity, Protocol, StopBits, WireMode};

pub const SYNC1: u8 = 0xB5;
pub const SYNC2: u8 = 0x62;

const CLASS_CFG: u8 = 0x06;
const CLASS_MON: u8 = 0x0A;
const CFG_PRT: u8 = 0x00;
const CFG_RATE: u8 = 0x08;
const MON_VER: u8 = 0x04;

/// UART1 on every u-blox part
const PORT_UART1: u8 = 0x01;
const PROTO_UBX: u16 = 0x0001;
const PROTO_NMEA: u16 = 0x0002;

const SUPPORTED_RATES: &[u32] = &[
    4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600,
];

/// Fletcher checksum over `bytes` (class through end of payload)
pub fn checksum(bytes: &[u8]) -> (u8, u8) {
    bytes.iter().fold((0u8, 0u8), |(a, b), &x| {
        let a = a.wrapping_add(x);
        (a, b.wrapping_add(a))
    })
}

/// Build a complete UBX frame
pub fn frame(class: u8, id: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend_from_slice(&[SYNC1, SYNC2, class, id]);
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    let (ck_a, ck_b) = checksum(&out[2..]);
    out.extend_from_slice(&[ck_a, ck_b]);
    out
}

/// UART mode word: 8 data bits plus the requested parity and stop bits
fn uart_mode(line: LineSettings) -> u32 {
    let char_len = 0b11 << 6;
    let parity = match line.parity {
        Parity::Even => 0b000,
        Parity::Odd => 0b001,
        Parity::None => 0b100,
    } << 9;
    let stop = match line.stop_bits {
        StopBits::One => 0b00,
        StopBits::Two => 0b10,
    } << 12;
    0x10 | char_len | parity | stop
}

fn cfg_prt(line: LineSettings, out_proto: u16) -> Vec<u8> {
    let mut payload = Vec::with_capacity(20);
    payload.extend_from_slice(&[PORT_UART1, 0x00]);
    payload.extend_from_slice(&0u16.to_le_bytes()); // txReady
    payload.extend_from_slice(&uart_mode(line).to_le_bytes());
    payload.extend_from_slice(&line.baud_rate.to_le_bytes());
    payload.extend_from_slice(&(PROTO_UBX | PROTO_NMEA).to_le_bytes());
    payload.extend_from_slice(&out_proto.to_le_bytes());
    payload.extend_from_slice(&0u16.to_le_bytes()); // flags
    payload.extend_from_slice(&0u16.to_le_bytes()); // reserved
    frame(CLASS_CFG, CFG_PRT, &payload)
}

fn nul_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

/// u-blox receivers
#[derive(Debug, Clone, Copy, Default)]
pub struct Ublox;

impl Driver for Ublox {
    fn type_name(&self) -> &'static str {
        "u-blox"
    }

    fn protocol(&self) -> Protocol {
        Protocol::Ubx
    }

    fn is_triggered_by(&self, sentence: &[u8]) -> bool {
        if sentence.starts_with(b"$PUBX") {
            return true;
        }
        // $GPTXT,01,01,02,u-blox ag - www.u-blox.com*50
        sentence.len() > 6
            && &sentence[3..6] == b"TXT"
            && sentence.windows(6).any(|w| w == b"u-blox")
    }

    fn subtype_from(&self, packet: &Packet) -> Option<String> {
        if packet.protocol != Protocol::Ubx || packet.bytes[2..4] != [CLASS_MON, MON_VER] {
            return None;
        }
        let payload = packet.payload();
        if payload.len() < 40 {
            return None;
        }
        let sw = nul_terminated(&payload[..30]);
        let hw = nul_terminated(&payload[30..40]);
        Some(format!("SW {sw},HW {hw}"))
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

impl ModeSwitcher for Ublox {
    fn mode_switch(&self, mode: WireMode, line: LineSettings) -> Vec<u8> {
        let out_proto = match mode {
            WireMode::Nmea => PROTO_NMEA,
            WireMode::Binary => PROTO_UBX,
        };
        cfg_prt(line, out_proto)
    }
}

impl SpeedSwitcher for Ublox {
    fn speed_switch(&self, target: LineSettings) -> Option<Vec<u8>> {
        if !SUPPORTED_RATES.contains(&target.baud_rate) {
            return None;
        }
        Some(cfg_prt(target, PROTO_UBX | PROTO_NMEA))
    }
}

impl RateSwitcher for Ublox {
    fn rate_switch(&self, cycle_secs: f64) -> Option<Vec<u8>> {
        let ms = (cycle_secs * 1000.0).round();
        if !(50.0..=65535.0).contains(&ms) {
            return None;
        }
        let mut payload = Vec::with_capacity(6);
        payload.extend_from_slice(&(ms as u16).to_le_bytes()); // measRate
        payload.extend_from_slice(&1u16.to_le_bytes()); // navRate
        payload.extend_from_slice(&1u16.to_le_bytes()); // timeRef: GPS
        Some(frame(CLASS_CFG, CFG_RATE, &payload))
    }
}

impl ControlSender for Ublox {
    /// `raw` is class, id, then payload
    fn control_frame(&self, raw: &[u8]) -> Option<Vec<u8>> {
        match raw {
            [class, id, payload @ ..] if payload.len() <= usize::from(u16::MAX) => {
                Some(frame(*class, *id, payload))
            }
            _ => None,
        }
    }
}
