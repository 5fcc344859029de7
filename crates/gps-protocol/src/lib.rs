//! GPS Protocol Library
//!
//! This crate provides packet recognition and control-message encoding for
//! GPS receivers that speak one of these wire protocols:
//!
//! - **NMEA 0183**: the baseline ASCII sentence format every receiver speaks
//! - **SiRF binary**: `A0 A2` framed messages with a 15-bit additive checksum
//! - **u-blox UBX**: `B5 62` framed messages with a Fletcher checksum
//!
//! # Architecture
//!
//! - [`lexer::PacketLexer`] is a streaming recognizer that turns raw bytes
//!   into [`Packet`]s, discarding line noise between frames.
//! - [`driver`] holds the per-receiver capability sets. A driver exposes the
//!   control operations it supports (mode, speed, rate, raw control send) as
//!   optional capability objects that callers query by presence.
//!
//! # Example
//!
//! ```rust
//! use gps_protocol::{lexer::PacketLexer, Protocol};
//!
//! let mut lexer = PacketLexer::new();
//! lexer.push_bytes(b"$GPGSA,A,1,,,,,,,,,,,,,,,*1E\r\n");
//!
//! let packet = lexer.next_packet().unwrap();
//! assert_eq!(packet.protocol, Protocol::Nmea);
//! ```

pub mod driver;
pub mod error;
pub mod escape;
pub mod lexer;
pub mod line;

pub use driver::{
    ControlSender, Driver, ModeSwitcher, RateSwitcher, SpeedSwitcher, TypeMatch, DRIVERS,
};
pub use error::{EscapeError, ParseError};
pub use escape::decode_escapes;
pub use line::{LineSettings, Parity, StopBits};

use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Identifies the wire protocol a packet or driver speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Protocol {
    /// NMEA 0183 sentences (the baseline text protocol)
    Nmea,
    /// SiRF binary protocol
    Sirf,
    /// u-blox UBX binary protocol
    Ubx,
}

impl Protocol {
    /// Returns a human-readable name for the protocol
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Nmea => "NMEA 0183",
            Protocol::Sirf => "SiRF binary",
            Protocol::Ubx => "u-blox UBX",
        }
    }

    /// Whether this is the vendor-neutral baseline text protocol
    pub fn is_baseline(&self) -> bool {
        matches!(self, Protocol::Nmea)
    }
}

/// Target representation for a mode switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WireMode {
    /// Baseline NMEA text sentences
    Nmea,
    /// The receiver's native vendor binary protocol
    Binary,
}

impl WireMode {
    pub fn name(&self) -> &'static str {
        match self {
            WireMode::Nmea => "NMEA",
            WireMode::Binary => "BINARY",
        }
    }
}

/// A complete, checksum-verified frame recognized by the lexer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Protocol the frame belongs to
    pub protocol: Protocol,
    /// Raw frame bytes including framing
    pub bytes: Vec<u8>,
}

impl Packet {
    /// Message payload without framing and checksum
    ///
    /// For NMEA this is the text between `$` and `*`.
    pub fn payload(&self) -> &[u8] {
        match self.protocol {
            Protocol::Nmea => {
                let end = self
                    .bytes
                    .iter()
                    .position(|&b| b == b'*' || b == b'\r' || b == b'\n')
                    .unwrap_or(self.bytes.len());
                &self.bytes[1.min(end)..end]
            }
            // A0 A2 len(2) ... cksum(2) B0 B3
            Protocol::Sirf => &self.bytes[4..self.bytes.len() - 4],
            // B5 62 class id len(2) ... ck_a ck_b
            Protocol::Ubx => &self.bytes[6..self.bytes.len() - 2],
        }
    }
}

/// Bit set describing what a decoded packet changed in the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChangeMask(u32);

impl ChangeMask {
    pub const NONE: ChangeMask = ChangeMask(0);
    /// A packet was recognized
    pub const PACKET: ChangeMask = ChangeMask(1 << 0);
    /// The bound driver changed
    pub const DRIVER: ChangeMask = ChangeMask(1 << 1);
    /// The sub-identification string changed
    pub const SUBTYPE: ChangeMask = ChangeMask(1 << 2);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: ChangeMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ChangeMask {
    type Output = ChangeMask;

    fn bitor(self, rhs: ChangeMask) -> ChangeMask {
        ChangeMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChangeMask {
    fn bitor_assign(&mut self, rhs: ChangeMask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ChangeMask {
    type Output = ChangeMask;

    fn bitand(self, rhs: ChangeMask) -> ChangeMask {
        ChangeMask(self.0 & rhs.0)
    }
}
