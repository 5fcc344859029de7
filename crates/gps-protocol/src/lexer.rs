//! Streaming packet recognizer
//!
//! Receivers emit a byte stream that may start mid-frame, contain line noise
//! from a wrong baud rate, or interleave NMEA text with vendor binary frames.
//! [`PacketLexer`] buffers incoming bytes and yields only complete frames
//! whose checksums verify.
//!
//! # Frame formats
//! ```text
//! NMEA:  $ ... [*hh] \r\n
//! SiRF:  A0 A2 [len:2 BE] [payload] [cksum:2 BE] B0 B3
//! UBX:   B5 62 [class] [id] [len:2 LE] [payload] [ck_a] [ck_b]
//! ```

use tracing::trace;

use crate::driver::{nmea, sirf, ubx};
use crate::error::ParseError;
use crate::{Packet, Protocol};

/// Longest NMEA sentence accepted (the standard says 82; vendors overrun it)
const MAX_NMEA_LEN: usize = 96;
/// Longest binary payload accepted
const MAX_BINARY_PAYLOAD: usize = 1024;
/// Bytes kept at most while waiting for a frame to complete
const MAX_BUFFER: usize = MAX_BINARY_PAYLOAD * 4;

/// Streaming lexer for NMEA, SiRF and UBX frames
#[derive(Debug, Default)]
pub struct PacketLexer {
    buffer: Vec<u8>,
    discarded: usize,
}

enum Scan {
    /// A verified frame of this length sits at the head of the buffer
    Frame(Protocol, usize),
    /// The head of the buffer is not a frame start; drop one byte
    Reject,
    /// Need more bytes to decide
    Incomplete,
}

impl PacketLexer {
    /// Create a new lexer
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
            discarded: 0,
        }
    }

    /// Push raw bytes into the lexer's buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        if self.buffer.len() > MAX_BUFFER {
            let excess = self.buffer.len() - MAX_BUFFER;
            self.buffer.drain(..excess);
            self.discarded += excess;
        }
    }

    /// Number of bytes thrown away as noise since creation
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Number of bytes waiting for a frame to complete
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Try to extract the next complete frame from the buffer
    pub fn next_packet(&mut self) -> Option<Packet> {
        loop {
            let Some(start) = self.find_start() else {
                self.skip(self.buffer.len());
                return None;
            };
            self.skip(start);

            match self.scan_head() {
                Scan::Frame(protocol, len) => {
                    let bytes: Vec<u8> = self.buffer.drain(..len).collect();
                    trace!("{} frame: {:02X?}", protocol.name(), bytes);
                    return Some(Packet { protocol, bytes });
                }
                Scan::Reject => self.skip(1),
                Scan::Incomplete => return None,
            }
        }
    }

    fn skip(&mut self, n: usize) {
        if n > 0 {
            self.buffer.drain(..n);
            self.discarded += n;
        }
    }

    fn find_start(&self) -> Option<usize> {
        self.buffer.iter().enumerate().position(|(i, &b)| {
            let next = self.buffer.get(i + 1).copied();
            match b {
                b'$' | b'!' => true,
                sirf::SYNC1 => next.map_or(true, |n| n == sirf::SYNC2),
                ubx::SYNC1 => next.map_or(true, |n| n == ubx::SYNC2),
                _ => false,
            }
        })
    }

    fn scan_head(&self) -> Scan {
        match self.buffer.first() {
            Some(b'$') | Some(b'!') => self.scan_nmea(),
            Some(&sirf::SYNC1) => self.scan_sirf(),
            Some(&ubx::SYNC1) => self.scan_ubx(),
            _ => Scan::Reject,
        }
    }

    fn scan_nmea(&self) -> Scan {
        let window = &self.buffer[..self.buffer.len().min(MAX_NMEA_LEN)];
        let Some(end) = window.iter().position(|&b| b == b'\n') else {
            return if self.buffer.len() >= MAX_NMEA_LEN {
                Scan::Reject
            } else {
                Scan::Incomplete
            };
        };

        match check_nmea(&self.buffer[..=end]) {
            Ok(()) => Scan::Frame(Protocol::Nmea, end + 1),
            Err(e) => {
                trace!("rejecting NMEA candidate: {}", e);
                Scan::Reject
            }
        }
    }

    fn scan_sirf(&self) -> Scan {
        if self.buffer.len() < 4 {
            return Scan::Incomplete;
        }
        if self.buffer[1] != sirf::SYNC2 {
            return Scan::Reject;
        }
        let len = usize::from(u16::from_be_bytes([self.buffer[2], self.buffer[3]]) & 0x7FFF);
        if len == 0 || len > MAX_BINARY_PAYLOAD {
            return Scan::Reject;
        }
        let total = len + 8;
        if self.buffer.len() < total {
            return Scan::Incomplete;
        }

        match check_sirf(&self.buffer[..total], len) {
            Ok(()) => Scan::Frame(Protocol::Sirf, total),
            Err(e) => {
                trace!("rejecting SiRF candidate: {}", e);
                Scan::Reject
            }
        }
    }

    fn scan_ubx(&self) -> Scan {
        if self.buffer.len() < 6 {
            return Scan::Incomplete;
        }
        if self.buffer[1] != ubx::SYNC2 {
            return Scan::Reject;
        }
        let len = usize::from(u16::from_le_bytes([self.buffer[4], self.buffer[5]]));
        if len > MAX_BINARY_PAYLOAD {
            return Scan::Reject;
        }
        let total = len + 8;
        if self.buffer.len() < total {
            return Scan::Incomplete;
        }

        let (ck_a, ck_b) = ubx::checksum(&self.buffer[2..6 + len]);
        let (got_a, got_b) = (self.buffer[total - 2], self.buffer[total - 1]);
        if (ck_a, ck_b) == (got_a, got_b) {
            Scan::Frame(Protocol::Ubx, total)
        } else {
            trace!(
                "rejecting UBX candidate: {}",
                ParseError::ChecksumMismatch {
                    expected: u16::from_be_bytes([ck_a, ck_b]),
                    actual: u16::from_be_bytes([got_a, got_b]),
                }
            );
            Scan::Reject
        }
    }
}

fn check_nmea(frame: &[u8]) -> Result<(), ParseError> {
    if frame.len() > MAX_NMEA_LEN {
        return Err(ParseError::Oversize {
            len: frame.len(),
            limit: MAX_NMEA_LEN,
        });
    }

    let text = frame
        .strip_suffix(b"\r\n")
        .or_else(|| frame.strip_suffix(b"\n"))
        .unwrap_or(frame);
    if text.len() < 2 {
        return Err(ParseError::InvalidFrame("sentence too short".into()));
    }
    if text[1..]
        .iter()
        .any(|&b| !(0x20..0x7F).contains(&b) || b == b'$')
    {
        return Err(ParseError::InvalidFrame("non-printable byte in sentence".into()));
    }

    let Some(star) = text.iter().rposition(|&b| b == b'*') else {
        // Checksums are optional in NMEA 0183
        return Ok(());
    };
    let digits = &text[star + 1..];
    let actual = std::str::from_utf8(digits)
        .ok()
        .filter(|s| s.len() == 2)
        .and_then(|s| u8::from_str_radix(s, 16).ok())
        .ok_or_else(|| ParseError::InvalidFrame("malformed checksum field".into()))?;
    let expected = nmea::checksum(&text[1..star]);
    if expected != actual {
        return Err(ParseError::ChecksumMismatch {
            expected: expected.into(),
            actual: actual.into(),
        });
    }
    Ok(())
}

fn check_sirf(frame: &[u8], len: usize) -> Result<(), ParseError> {
    let trailer = &frame[len + 6..];
    if trailer != [sirf::END1, sirf::END2] {
        return Err(ParseError::InvalidFrame("missing B0 B3 trailer".into()));
    }
    let expected = sirf::checksum(&frame[4..4 + len]);
    let actual = u16::from_be_bytes([frame[4 + len], frame[5 + len]]);
    if expected != actual {
        return Err(ParseError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const GGA: &[u8] =
        b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";

    #[test]
    fn test_nmea_sentence() {
        let mut lexer = PacketLexer::new();
        lexer.push_bytes(GGA);

        let packet = lexer.next_packet().unwrap();
        assert_eq!(packet.protocol, Protocol::Nmea);
        assert_eq!(packet.bytes, GGA);
        assert!(lexer.next_packet().is_none());
    }

    #[test]
    fn test_partial_sentence_waits() {
        let mut lexer = PacketLexer::new();
        lexer.push_bytes(&GGA[..20]);
        assert!(lexer.next_packet().is_none());

        lexer.push_bytes(&GGA[20..]);
        assert!(lexer.next_packet().is_some());
    }

    #[test]
    fn test_bad_nmea_checksum_rejected() {
        let mut lexer = PacketLexer::new();
        lexer.push_bytes(b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*48\r\n");
        assert!(lexer.next_packet().is_none());
        assert!(lexer.discarded() > 0);
    }

    #[test]
    fn test_noise_before_frame_is_skipped() {
        let mut lexer = PacketLexer::new();
        lexer.push_bytes(&[0x00, 0xFF, 0x13, b'x', b'$', 0x01]);
        lexer.push_bytes(GGA);

        let packet = lexer.next_packet().unwrap();
        assert_eq!(packet.bytes, GGA);
    }

    #[test]
    fn test_sirf_frame() {
        let frame = sirf::frame(&[0x06, b'G', b'S', b'W', b'3', 0]);
        let mut lexer = PacketLexer::new();
        lexer.push_bytes(&frame);

        let packet = lexer.next_packet().unwrap();
        assert_eq!(packet.protocol, Protocol::Sirf);
        assert_eq!(packet.payload(), &[0x06, b'G', b'S', b'W', b'3', 0]);
    }

    #[test]
    fn test_ubx_frame_split_across_pushes() {
        let frame = ubx::frame(0x0A, 0x04, b"ROM CORE 1.00\0");
        let mut lexer = PacketLexer::new();
        lexer.push_bytes(&frame[..1]);
        assert!(lexer.next_packet().is_none());
        lexer.push_bytes(&frame[1..]);

        let packet = lexer.next_packet().unwrap();
        assert_eq!(packet.protocol, Protocol::Ubx);
        assert_eq!(packet.bytes, frame);
    }

    #[test]
    fn test_mixed_stream() {
        let mut lexer = PacketLexer::new();
        lexer.push_bytes(GGA);
        lexer.push_bytes(&ubx::frame(0x01, 0x07, &[0u8; 4]));
        lexer.push_bytes(&sirf::frame(&[0x02, 0x00]));

        let kinds: Vec<_> = std::iter::from_fn(|| lexer.next_packet())
            .map(|p| p.protocol)
            .collect();
        assert_eq!(kinds, vec![Protocol::Nmea, Protocol::Ubx, Protocol::Sirf]);
    }

    proptest! {
        #[test]
        fn frame_survives_leading_noise(
            noise in prop::collection::vec(
                any::<u8>().prop_filter("binary sync byte", |b| *b != sirf::SYNC1 && *b != ubx::SYNC1),
                0..64,
            )
        ) {
            let mut lexer = PacketLexer::new();
            lexer.push_bytes(&noise);
            lexer.push_bytes(GGA);

            let found: Vec<_> = std::iter::from_fn(|| lexer.next_packet()).collect();
            prop_assert!(found.iter().any(|p| p.bytes == GGA));
        }
    }
}
