//! Per-receiver drivers and their capability sets
//!
//! Every driver names the protocol it natively speaks and may offer any of
//! four write-class capabilities. A capability is either present (the
//! accessor returns `Some`) or absent; callers must check before invoking.
//!
//! | Capability        | Accessor             | Flag    |
//! |-------------------|----------------------|---------|
//! | Mode switch       | [`Driver::mode_switcher`]  | `-b/-n` |
//! | Speed switch      | [`Driver::speed_switcher`] | `-s`    |
//! | Report rate       | [`Driver::rate_switcher`]  | `-c`    |
//! | Raw control send  | [`Driver::control_sender`] | `-x`    |
//!
//! Capabilities only encode bytes; transmitting them (and honoring read-only
//! mode) is up to the caller.

pub mod nmea;
pub mod sirf;
pub mod ubx;

use std::fmt;

use crate::{LineSettings, Packet, Protocol, WireMode};

/// Switches the receiver between NMEA and its native binary protocol
pub trait ModeSwitcher {
    /// Bytes that ask the receiver to change to `mode`, keeping `line`
    fn mode_switch(&self, mode: WireMode, line: LineSettings) -> Vec<u8>;
}

/// Reconfigures the receiver's own serial parameters
pub trait SpeedSwitcher {
    /// Bytes that ask the receiver to adopt `target`, or `None` if the
    /// driver cannot express that combination
    fn speed_switch(&self, target: LineSettings) -> Option<Vec<u8>>;
}

/// Changes the receiver's report cadence
pub trait RateSwitcher {
    /// Bytes that set the fix cycle to `cycle_secs`, or `None` if out of range
    fn rate_switch(&self, cycle_secs: f64) -> Option<Vec<u8>>;
}

/// Wraps a caller-supplied payload in the protocol's framing
pub trait ControlSender {
    /// Framed bytes for `raw`, or `None` if the payload cannot be framed
    fn control_frame(&self, raw: &[u8]) -> Option<Vec<u8>>;
}

/// A receiver driver: identity, recognition hooks and capability set
pub trait Driver: Send + Sync {
    /// Type name shown to users and matched by `-t`
    fn type_name(&self) -> &'static str;

    /// Protocol the driver natively decodes
    fn protocol(&self) -> Protocol;

    /// Whether an NMEA sentence announces this receiver's vendor dialect
    fn is_triggered_by(&self, _sentence: &[u8]) -> bool {
        false
    }

    /// Sub-identification (firmware/version detail) carried by a packet
    fn subtype_from(&self, _packet: &Packet) -> Option<String> {
        None
    }

    fn mode_switcher(&self) -> Option<&dyn ModeSwitcher> {
        None
    }

    fn speed_switcher(&self) -> Option<&dyn SpeedSwitcher> {
        None
    }

    fn rate_switcher(&self) -> Option<&dyn RateSwitcher> {
        None
    }

    fn control_sender(&self) -> Option<&dyn ControlSender> {
        None
    }
}

impl fmt::Debug for dyn Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Built-in drivers, generic NMEA first
pub static DRIVERS: &[&'static dyn Driver] = &[&nmea::GenericNmea, &sirf::Sirf, &ubx::Ublox];

/// The fallback driver every receiver starts out bound to
pub fn generic() -> &'static dyn Driver {
    &nmea::GenericNmea
}

/// Look up a driver by exact type name
pub fn by_name(name: &str) -> Option<&'static dyn Driver> {
    DRIVERS.iter().copied().find(|d| d.type_name() == name)
}

/// Driver whose native protocol is `protocol`
pub fn by_protocol(protocol: Protocol) -> &'static dyn Driver {
    DRIVERS
        .iter()
        .copied()
        .find(|d| d.protocol() == protocol)
        .unwrap_or_else(generic)
}

/// First non-generic driver announced by an NMEA sentence
pub fn by_trigger(sentence: &[u8]) -> Option<&'static dyn Driver> {
    DRIVERS
        .iter()
        .copied()
        .find(|d| d.is_triggered_by(sentence))
}

/// Outcome of resolving a user-supplied type name
#[derive(Debug)]
pub enum TypeMatch {
    /// Exactly one driver matched
    Unique(&'static dyn Driver),
    /// Nothing matched
    NoMatch,
    /// Several drivers matched the substring
    Ambiguous(Vec<&'static str>),
}

/// Resolve `pattern` against driver type names
///
/// An exact name wins outright; otherwise `pattern` is matched as a substring.
pub fn match_type(pattern: &str) -> TypeMatch {
    if let Some(driver) = by_name(pattern) {
        return TypeMatch::Unique(driver);
    }

    let matches: Vec<_> = DRIVERS
        .iter()
        .copied()
        .filter(|d| d.type_name().contains(pattern))
        .collect();

    match matches.as_slice() {
        [] => TypeMatch::NoMatch,
        [driver] => TypeMatch::Unique(*driver),
        many => TypeMatch::Ambiguous(many.iter().map(|d| d.type_name()).collect()),
    }
}

/// One line of the driver listing: capability columns, then the type name
pub fn capability_row(driver: &dyn Driver) -> String {
    let column = |present: bool, flag: &str| {
        if present {
            format!("{flag}\t")
        } else {
            "\t".to_string()
        }
    };
    format!(
        "{}{}{}{}{}",
        column(driver.mode_switcher().is_some(), "-[bn]"),
        column(driver.speed_switcher().is_some(), "-s"),
        column(driver.rate_switcher().is_some(), "-c"),
        column(driver.control_sender().is_some(), "-x"),
        driver.type_name()
    )
}
