//! GPS Receiver Simulation Library
//!
//! Test doubles for exercising receiver control without hardware or a
//! running daemon:
//!
//! - **MockLink**: a scripted [`gps_detect::DeviceLink`] that journals every
//!   line change, write and drain
//! - **VirtualReceiver**: produces the traffic a SiRF, u-blox or plain NMEA
//!   receiver emits after power-up
//! - **FakeDaemon**: a TCP server speaking the daemon's line protocol from
//!   canned responses
//!
//! # Example
//!
//! ```rust
//! use gps_sim::{MockLink, ReceiverKind, VirtualReceiver};
//!
//! let mut receiver = VirtualReceiver::new(ReceiverKind::Sirf {
//!     version: "GSW3.2.4".into(),
//! });
//! receiver.power_up(3);
//!
//! let mut link = MockLink::new("/dev/ttyUSB0", 4800);
//! receiver.drain_into(&mut link, 4800);
//! assert!(link.journal().events().is_empty());
//! ```

pub mod daemon;
pub mod link;
pub mod receiver;

pub use daemon::{DaemonRule, FakeDaemon};
pub use link::{LinkEvent, LinkJournal, MockLink};
pub use receiver::{ReceiverConfig, ReceiverKind, VirtualReceiver};
