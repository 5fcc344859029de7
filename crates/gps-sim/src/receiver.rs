//! Virtual receiver
//!
//! Produces the byte stream a receiver emits after power-up: a run of
//! baseline NMEA sentences, then the vendor's announcement sentence, then
//! (for binary-capable receivers) a version message.

use std::collections::VecDeque;

use gps_protocol::driver::{nmea, sirf, ubx};
use gps_protocol::Protocol;
use serde::{Deserialize, Serialize};

use crate::link::MockLink;

/// Which kind of receiver to simulate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiverKind {
    /// Speaks only baseline NMEA
    GenericNmea,
    /// SiRF chipset reporting this software version
    Sirf { version: String },
    /// u-blox module reporting these software and hardware versions
    Ublox { software: String, hardware: String },
}

impl ReceiverKind {
    /// Native protocol of the simulated chipset
    pub fn protocol(&self) -> Protocol {
        match self {
            ReceiverKind::GenericNmea => Protocol::Nmea,
            ReceiverKind::Sirf { .. } => Protocol::Sirf,
            ReceiverKind::Ublox { .. } => Protocol::Ubx,
        }
    }
}

/// Configuration for creating a virtual receiver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    pub kind: ReceiverKind,
    /// Baseline sentences emitted before the vendor announcement
    pub baseline_sentences: usize,
    /// Baud rate the receiver talks at
    pub baud_rate: u32,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            kind: ReceiverKind::GenericNmea,
            baseline_sentences: 4,
            baud_rate: 4800,
        }
    }
}

const BASELINE: &[&str] = &[
    "GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,",
    "GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W",
    "GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1",
    "GPVTG,054.7,T,034.4,M,005.5,N,010.2,K",
];

/// A simulated receiver that queues protocol-accurate output
#[derive(Debug)]
pub struct VirtualReceiver {
    kind: ReceiverKind,
    sentence_index: usize,
    pending_output: VecDeque<Vec<u8>>,
}

impl VirtualReceiver {
    pub fn new(kind: ReceiverKind) -> Self {
        Self {
            kind,
            sentence_index: 0,
            pending_output: VecDeque::new(),
        }
    }

    /// Create a receiver and queue its power-up traffic
    pub fn from_config(config: &ReceiverConfig) -> Self {
        let mut receiver = Self::new(config.kind.clone());
        receiver.power_up(config.baseline_sentences);
        receiver
    }

    pub fn kind(&self) -> &ReceiverKind {
        &self.kind
    }

    /// Queue `count` baseline NMEA sentences
    pub fn emit_baseline(&mut self, count: usize) {
        for _ in 0..count {
            let body = BASELINE[self.sentence_index % BASELINE.len()];
            self.sentence_index += 1;
            self.pending_output.push_back(nmea::frame(body));
        }
    }

    /// Queue the vendor announcement sentence, if the chipset has one
    pub fn emit_announcement(&mut self) {
        let body = match &self.kind {
            ReceiverKind::GenericNmea => return,
            ReceiverKind::Sirf { version } => format!("PSRFTXT,Version:{version}"),
            ReceiverKind::Ublox { .. } => "GPTXT,01,01,02,u-blox ag - www.u-blox.com".to_string(),
        };
        self.pending_output.push_back(nmea::frame(&body));
    }

    /// Queue the binary version message, if the chipset has one
    pub fn emit_version(&mut self) {
        let frame = match &self.kind {
            ReceiverKind::GenericNmea => return,
            ReceiverKind::Sirf { version } => {
                let mut payload = vec![0x06];
                payload.extend_from_slice(version.as_bytes());
                payload.push(0);
                sirf::frame(&payload)
            }
            ReceiverKind::Ublox { software, hardware } => {
                let mut payload = vec![0u8; 40];
                copy_field(&mut payload[..30], software);
                copy_field(&mut payload[30..], hardware);
                ubx::frame(0x0A, 0x04, &payload)
            }
        };
        self.pending_output.push_back(frame);
    }

    /// Queue a complete power-up sequence
    pub fn power_up(&mut self, baseline_sentences: usize) {
        self.emit_baseline(baseline_sentences);
        self.emit_announcement();
        self.emit_version();
    }

    /// Take the next queued frame
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        self.pending_output.pop_front()
    }

    pub fn has_output(&self) -> bool {
        !self.pending_output.is_empty()
    }

    /// Move all queued frames into `link`, readable only at `baud_rate`
    pub fn drain_into(&mut self, link: &mut MockLink, baud_rate: u32) {
        while let Some(frame) = self.take_output() {
            link.push_input_at(baud_rate, frame);
        }
    }
}

fn copy_field(dest: &mut [u8], text: &str) {
    let n = text.len().min(dest.len().saturating_sub(1));
    dest[..n].copy_from_slice(&text.as_bytes()[..n]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use gps_protocol::lexer::PacketLexer;

    fn lex_all(receiver: &mut VirtualReceiver) -> Vec<gps_protocol::Packet> {
        let mut lexer = PacketLexer::new();
        while let Some(frame) = receiver.take_output() {
            lexer.push_bytes(&frame);
        }
        std::iter::from_fn(|| lexer.next_packet()).collect()
    }

    #[test]
    fn test_generic_power_up_is_all_nmea() {
        let mut receiver = VirtualReceiver::new(ReceiverKind::GenericNmea);
        receiver.power_up(6);

        let packets = lex_all(&mut receiver);
        assert_eq!(packets.len(), 6);
        assert!(packets.iter().all(|p| p.protocol == Protocol::Nmea));
    }

    #[test]
    fn test_sirf_power_up() {
        let mut receiver = VirtualReceiver::new(ReceiverKind::Sirf {
            version: "GSW3.2.4".into(),
        });
        receiver.power_up(2);

        let packets = lex_all(&mut receiver);
        assert_eq!(packets.len(), 4);
        assert!(packets[2].bytes.starts_with(b"$PSRFTXT"));
        assert_eq!(packets[3].protocol, Protocol::Sirf);
        assert_eq!(packets[3].payload()[0], 0x06);
    }

    #[test]
    fn test_ublox_version_is_mon_ver() {
        let config = ReceiverConfig {
            kind: ReceiverKind::Ublox {
                software: "7.03 (45969)".into(),
                hardware: "00040007".into(),
            },
            baseline_sentences: 0,
            ..Default::default()
        };
        let mut receiver = VirtualReceiver::from_config(&config);

        let packets = lex_all(&mut receiver);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[1].protocol, Protocol::Ubx);
        assert_eq!(&packets[1].bytes[2..4], &[0x0A, 0x04]);
    }
}
