//! GPS Receiver Detection Library
//!
//! This crate opens a serial receiver, watches its traffic and decides which
//! driver it needs, stepping through baud rates until packets are recognized.
//!
//! # Example
//!
//! ```rust,no_run
//! use gps_detect::{DeviceHunter, HuntConfig, SerialLink};
//! use gps_protocol::LineSettings;
//!
//! # async fn run() -> Result<(), gps_detect::DetectError> {
//! let mut link = SerialLink::open("/dev/ttyUSB0", LineSettings::n81(4800))?;
//! let hunter = DeviceHunter::new(HuntConfig::default());
//! let outcome = hunter.hunt(&mut link, &mut ()).await?;
//!
//! println!("{} at {}", outcome.driver.type_name(), outcome.line.baud_rate);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod hunter;
pub mod link;

pub use error::DetectError;
pub use hunter::{
    DeviceHunter, HuntConfig, HuntOutcome, PacketEvent, PacketObserver, SyncPolicy, Verdict,
    SYNC_THRESHOLD,
};
pub use link::{DeviceLink, SerialLink};
