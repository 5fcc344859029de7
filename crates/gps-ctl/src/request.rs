//! What the user asked for, and its validated form
//!
//! A [`Request`] carries the raw arguments. [`Request::plan`] checks them all
//! before any device or daemon is touched and yields a [`Plan`] the
//! dispatcher can execute without further parsing.

use std::fmt;
use std::str::FromStr;

use gps_protocol::driver::{self, Driver, TypeMatch};
use gps_protocol::{decode_escapes, LineSettings, Parity, StopBits, WireMode};
use tracing::{error, info};

use crate::error::CtlError;

/// Raw control request
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Target device path
    pub device: Option<String>,
    /// Driver type name or substring (`-t`)
    pub forced_type: Option<String>,
    pub to_binary: bool,
    pub to_nmea: bool,
    pub reset: bool,
    /// `rate[:WPS]` (`-s`)
    pub speed: Option<String>,
    /// Fix cycle in seconds (`-c`)
    pub rate: Option<String>,
    /// Control string with backslash escapes (`-x`)
    pub control: Option<String>,
    /// Print control bytes instead of sending them (`-e`)
    pub echo: bool,
    /// Skip the daemon (`-f`)
    pub force_direct: bool,
}

/// Mutually exclusive high-level intents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    ToBinary,
    ToNmea,
    Reset,
}

impl Intent {
    /// Target wire mode of a mode switch
    pub fn wire_mode(&self) -> Option<WireMode> {
        match self {
            Intent::ToBinary => Some(WireMode::Binary),
            Intent::ToNmea => Some(WireMode::Nmea),
            Intent::Reset => None,
        }
    }
}

/// Requested line settings, `rate[:WPS]`
///
/// Word length must be 7 or 8 but is otherwise not transmitted; parity and
/// stop bits are optional and default to the line's current values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedSpec {
    pub baud_rate: u32,
    pub framing: Option<(Parity, StopBits)>,
}

impl SpeedSpec {
    /// Settings to request, filling unspecified framing from `current`
    pub fn line(&self, current: LineSettings) -> LineSettings {
        let (parity, stop_bits) = self
            .framing
            .unwrap_or((current.parity, current.stop_bits));
        LineSettings::new(self.baud_rate, parity, stop_bits)
    }
}

impl FromStr for SpeedSpec {
    type Err = CtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rate, modespec) = match s.split_once(':') {
            Some((rate, modespec)) => (rate, Some(modespec)),
            None => (s, None),
        };
        let baud_rate = rate
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|&b| b > 0)
            .ok_or_else(|| CtlError::User(format!("invalid speed '{rate}'")))?;

        let framing = match modespec {
            None => None,
            Some(modespec) => {
                let mut chars = modespec.chars();
                match chars.next() {
                    Some('7') | Some('8') => {}
                    _ => return Err(CtlError::User("No support for that word length".into())),
                }
                let parity = chars.next().unwrap_or(' ');
                let parity = Parity::from_char(parity)
                    .ok_or_else(|| CtlError::User(format!("What parity is '{parity}'?")))?;
                let stop_bits = chars
                    .next()
                    .and_then(StopBits::from_char)
                    .ok_or_else(|| CtlError::User("Stop bits must be 1 or 2".into()))?;
                Some((parity, stop_bits))
            }
        };

        Ok(Self { baud_rate, framing })
    }
}

impl fmt::Display for SpeedSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.baud_rate)?;
        if let Some((parity, stop_bits)) = self.framing {
            write!(f, ":8{}{}", parity.as_char(), stop_bits.count())?;
        }
        Ok(())
    }
}

/// A validated request
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub device: Option<String>,
    pub forced: Option<&'static dyn Driver>,
    pub intent: Option<Intent>,
    pub speed: Option<SpeedSpec>,
    pub rate: Option<f64>,
    /// Control payload with escapes decoded
    pub control: Option<Vec<u8>>,
    pub echo: bool,
    pub force_direct: bool,
}

impl Plan {
    /// Whether the daemon should be tried before the device
    ///
    /// Reset always goes to the daemon first so it can be refused while the
    /// daemon owns the device.
    pub fn wants_daemon(&self) -> bool {
        self.intent == Some(Intent::Reset)
            || !(self.force_direct || self.echo || self.control.is_some())
    }

    /// Whether anything beyond identification was requested
    pub fn has_control_op(&self) -> bool {
        self.intent.is_some() || self.speed.is_some() || self.rate.is_some() || self.control.is_some()
    }

    pub fn wire_mode(&self) -> Option<WireMode> {
        self.intent.and_then(|intent| intent.wire_mode())
    }
}

impl Request {
    /// Validate every argument; no I/O happens here
    pub fn plan(&self) -> Result<Plan, CtlError> {
        let intents: Vec<Intent> = [
            (self.to_binary, Intent::ToBinary),
            (self.to_nmea, Intent::ToNmea),
            (self.reset, Intent::Reset),
        ]
        .into_iter()
        .filter_map(|(set, intent)| set.then_some(intent))
        .collect();
        if intents.len() > 1 {
            return Err(CtlError::User("make up your mind, would you?".into()));
        }

        let forced = match self.forced_type.as_deref() {
            None => None,
            Some(pattern) => resolve_type(pattern)?,
        };

        let speed = self.speed.as_deref().map(str::parse).transpose()?;

        let rate = match self.rate.as_deref() {
            None => None,
            Some(text) => Some(
                text.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|r| r.is_finite() && *r > 0.0)
                    .ok_or_else(|| CtlError::User(format!("invalid cycle '{text}'")))?,
            ),
        };

        let control = match self.control.as_deref() {
            None => None,
            Some(text) => Some(
                decode_escapes(text)
                    .map_err(|e| CtlError::User(format!("invalid escape string ({e})")))?,
            ),
        };

        Ok(Plan {
            device: self.device.clone(),
            forced,
            intent: intents.first().copied(),
            speed,
            rate,
            control,
            echo: self.echo,
            force_direct: self.force_direct,
        })
    }
}

/// Resolve a forced type; no match is reported and ignored
fn resolve_type(pattern: &str) -> Result<Option<&'static dyn Driver>, CtlError> {
    match driver::match_type(pattern) {
        TypeMatch::Unique(driver) => {
            info!("{} driver selected", driver.type_name());
            Ok(Some(driver))
        }
        TypeMatch::NoMatch => {
            error!("no driver type name matches '{}'", pattern);
            Ok(None)
        }
        TypeMatch::Ambiguous(names) => Err(CtlError::User(format!(
            "{} driver type names match '{}'",
            names.len(),
            pattern
        ))),
    }
}
