//! Protocol hunting
//!
//! [`DeviceHunter`] reads raw traffic from a [`DeviceLink`], feeds it through
//! the packet lexer and decides which driver the receiver needs. When nothing
//! is recognized for a while it steps the local line through the baud ladder.
//!
//! Hunting ends when [`SyncPolicy`] commits: immediately on any vendor binary
//! packet, or after [`SYNC_THRESHOLD`] baseline NMEA sentences. Vendor
//! dialects announce themselves with secondary sentences that only show up
//! after a few baseline ones, so early NMEA is never trusted as final.

use std::time::Duration;

use gps_protocol::driver::{self, Driver};
use gps_protocol::lexer::PacketLexer;
use gps_protocol::{ChangeMask, LineSettings, Packet, Protocol};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, trace, warn};

use crate::error::DetectError;
use crate::link::DeviceLink;

/// Baseline sentences required before NMEA is accepted as final
pub const SYNC_THRESHOLD: usize = 15;

/// Default baud ladder, in hunting order
pub const DEFAULT_BAUD_RATES: &[u32] = &[4800, 9600, 19200, 38400, 57600, 115200, 2400];

/// Hunting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HuntConfig {
    /// Overall deadline for reaching sync
    pub timeout: Duration,
    /// Upper bound on a single readiness wait
    pub poll_interval: Duration,
    /// Time without a recognized packet before stepping to the next rate
    pub hunt_window: Duration,
    /// Rates tried when hunting, in order
    pub baud_rates: Vec<u32>,
}

impl Default for HuntConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(8),
            poll_interval: Duration::from_secs(1),
            hunt_window: Duration::from_millis(1500),
            baud_rates: DEFAULT_BAUD_RATES.to_vec(),
        }
    }
}

/// One decoded unit of traffic, delivered to the observer during hunting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketEvent {
    /// What this packet changed in the hunt state
    pub changed: ChangeMask,
    /// Protocol of the packet itself
    pub packet: Protocol,
    /// Native protocol of the driver bound after this packet
    pub classification: Protocol,
}

/// Receives every packet event, synchronously, from the polling loop
pub trait PacketObserver {
    fn on_packet(&mut self, event: &PacketEvent);
}

impl PacketObserver for () {
    fn on_packet(&mut self, _event: &PacketEvent) {}
}

impl<F> PacketObserver for F
where
    F: FnMut(&PacketEvent),
{
    fn on_packet(&mut self, event: &PacketEvent) {
        self(event)
    }
}

/// Decision after observing one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep reading
    Hunting,
    /// Identification is final
    Synced,
}

/// Decides when the hunt may commit to an identification
#[derive(Debug, Default)]
pub struct SyncPolicy {
    baseline_seen: usize,
}

impl SyncPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of baseline events counted so far
    pub fn baseline_seen(&self) -> usize {
        self.baseline_seen
    }

    pub fn observe(&mut self, event: &PacketEvent) -> Verdict {
        if !event.classification.is_baseline() {
            return Verdict::Synced;
        }

        self.baseline_seen += 1;
        if self.baseline_seen >= SYNC_THRESHOLD {
            Verdict::Synced
        } else {
            Verdict::Hunting
        }
    }
}

/// Result of a successful hunt
#[derive(Debug, Clone)]
pub struct HuntOutcome {
    /// Driver bound at sync
    pub driver: &'static dyn Driver,
    /// Sub-identification string, empty when none was seen
    pub subtype: String,
    /// Local line settings at sync
    pub line: LineSettings,
    /// Packets recognized during the hunt
    pub packets: usize,
}

/// Identifies the receiver on the other end of a link
#[derive(Debug, Clone)]
pub struct DeviceHunter {
    config: HuntConfig,
}

struct HuntState {
    driver: &'static dyn Driver,
    subtype: String,
    packets: usize,
}

impl HuntState {
    /// Rebind the driver and mine the subtype for one packet
    fn absorb(&mut self, packet: &Packet) -> ChangeMask {
        let mut changed = ChangeMask::PACKET;

        let candidate = match packet.protocol {
            Protocol::Nmea if self.driver.protocol().is_baseline() => {
                driver::by_trigger(&packet.bytes)
            }
            Protocol::Nmea => None,
            protocol if protocol != self.driver.protocol() => Some(driver::by_protocol(protocol)),
            _ => None,
        };
        if let Some(next) = candidate {
            if next.type_name() != self.driver.type_name() {
                info!("Switching to {} driver", next.type_name());
                self.driver = next;
                changed |= ChangeMask::DRIVER;
            }
        }

        if let Some(subtype) = self.driver.subtype_from(packet) {
            if subtype != self.subtype {
                debug!("Subtype: {}", subtype);
                self.subtype = subtype;
                changed |= ChangeMask::SUBTYPE;
            }
        }

        self.packets += 1;
        changed
    }
}

impl DeviceHunter {
    pub fn new(config: HuntConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HuntConfig {
        &self.config
    }

    /// Read from `link` until the receiver is identified or the deadline passes
    ///
    /// Every recognized packet is reported to `observer` before the sync
    /// policy sees it.
    pub async fn hunt<L, O>(&self, link: &mut L, observer: &mut O) -> Result<HuntOutcome, DetectError>
    where
        L: DeviceLink + ?Sized,
        O: PacketObserver + ?Sized,
    {
        let deadline = Instant::now() + self.config.timeout;
        let mut lexer = PacketLexer::new();
        let mut policy = SyncPolicy::new();
        let mut state = HuntState {
            driver: driver::generic(),
            subtype: String::new(),
            packets: 0,
        };
        let mut rate_index = self
            .config
            .baud_rates
            .iter()
            .position(|&rate| rate == link.line_settings().baud_rate)
            .unwrap_or(0);
        let mut last_packet = Instant::now();
        let mut buf = [0u8; 1024];

        info!("Hunting on {} at {}", link.path(), link.line_settings());

        loop {
            let now = Instant::now();
            if now >= deadline {
                warn!("No sync on {} before the deadline", link.path());
                return Err(DetectError::TimedOut {
                    seconds: self.config.timeout.as_secs(),
                });
            }
            let wait = self.config.poll_interval.min(deadline - now);

            let n = match timeout(wait, link.read(&mut buf)).await {
                Err(_) => {
                    if last_packet.elapsed() >= self.config.hunt_window {
                        self.step_rate(link, &mut rate_index, &mut lexer)?;
                        last_packet = Instant::now();
                    }
                    continue;
                }
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Ok(Err(e)) => {
                    return Err(DetectError::Io {
                        path: link.path().to_string(),
                        source: e,
                    })
                }
                Ok(Ok(0)) => {
                    return Err(DetectError::Device {
                        path: link.path().to_string(),
                        reason: "end of file".into(),
                    })
                }
                Ok(Ok(n)) => n,
            };

            trace!("Read {} bytes: {:02X?}", n, &buf[..n]);
            lexer.push_bytes(&buf[..n]);

            while let Some(packet) = lexer.next_packet() {
                last_packet = Instant::now();
                let changed = state.absorb(&packet);
                let event = PacketEvent {
                    changed,
                    packet: packet.protocol,
                    classification: state.driver.protocol(),
                };
                observer.on_packet(&event);

                if policy.observe(&event) == Verdict::Synced {
                    info!(
                        "Synced on {} as {} after {} packets",
                        link.path(),
                        state.driver.type_name(),
                        state.packets
                    );
                    return Ok(HuntOutcome {
                        driver: state.driver,
                        subtype: state.subtype,
                        line: link.line_settings(),
                        packets: state.packets,
                    });
                }
            }

            // A wrong rate yields a steady stream of noise, not silence
            if last_packet.elapsed() >= self.config.hunt_window {
                self.step_rate(link, &mut rate_index, &mut lexer)?;
                last_packet = Instant::now();
            }
        }
    }

    fn step_rate<L>(
        &self,
        link: &mut L,
        rate_index: &mut usize,
        lexer: &mut PacketLexer,
    ) -> Result<(), DetectError>
    where
        L: DeviceLink + ?Sized,
    {
        let rates = &self.config.baud_rates;
        if rates.is_empty() {
            return Ok(());
        }
        *rate_index = (*rate_index + 1) % rates.len();
        let line = LineSettings::n81(rates[*rate_index]);
        debug!("Nothing recognized on {}, trying {}", link.path(), line);
        link.set_line_settings(line)?;
        lexer.clear();
        Ok(())
    }
}
