//! Serial line parameters shared by drivers, the hunter and the daemon client

use std::fmt;

/// Serial parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    /// Parse the single-letter form used on the command line and the daemon wire
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'N' => Some(Parity::None),
            'O' => Some(Parity::Odd),
            'E' => Some(Parity::Even),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        }
    }
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl StopBits {
    pub fn from_count(n: u8) -> Option<Self> {
        match n {
            1 => Some(StopBits::One),
            2 => Some(StopBits::Two),
            _ => None,
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '1' => Some(StopBits::One),
            '2' => Some(StopBits::Two),
            _ => None,
        }
    }

    pub fn count(&self) -> u8 {
        match self {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

/// Link speed and framing of a serial line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineSettings {
    /// Baud rate in bits per second
    pub baud_rate: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl LineSettings {
    /// 8 data bits, no parity, one stop bit
    pub const fn n81(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }

    pub const fn new(baud_rate: u32, parity: Parity, stop_bits: StopBits) -> Self {
        Self {
            baud_rate,
            parity,
            stop_bits,
        }
    }
}

impl Default for LineSettings {
    fn default() -> Self {
        Self::n81(4800)
    }
}

impl fmt::Display for LineSettings {
    /// Renders as `4800N1`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.baud_rate,
            self.parity.as_char(),
            self.stop_bits.count()
        )
    }
}
