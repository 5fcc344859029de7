//! GPS Receiver Control
//!
//! This crate drives a receiver either through the daemon that owns it or,
//! when no daemon answers, directly over the serial line.
//!
//! # Architecture
//!
//! - [`CommandDispatcher`] validates a [`Request`], picks the daemon or the
//!   direct path and sequences the requested operations.
//! - [`DaemonClient`] ships one command at a time and waits, bounded by a
//!   deadline, for a matching or error response.
//! - On the direct path the [`gps_detect::DeviceHunter`] identifies the
//!   receiver and the [`ControlAdapter`] invokes the bound driver's
//!   capabilities through a [`Session`], settling the line after each write.
//!
//! # Example
//!
//! ```rust,no_run
//! use gps_ctl::{CommandDispatcher, Context, Request, SystemBackend};
//!
//! # async fn run() -> Result<(), gps_ctl::CtlError> {
//! let request = Request {
//!     device: Some("/dev/ttyUSB0".into()),
//!     to_nmea: true,
//!     ..Default::default()
//! };
//!
//! let mut dispatcher = CommandDispatcher::new(Context::default(), SystemBackend, std::io::stdout());
//! let outcome = dispatcher.run(&request).await?;
//! std::process::exit(outcome.exit_code());
//! # }
//! ```

pub mod adapter;
pub mod context;
pub mod daemon;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod request;
pub mod reset;
pub mod session;

pub use adapter::{ControlAdapter, SETTLE_DELAY};
pub use context::Context;
pub use daemon::{DaemonClient, DeviceReport, Expect, Response, ResponseMask};
pub use device::DeviceDescriptor;
pub use dispatcher::{Backend, CommandDispatcher, Outcome, SystemBackend};
pub use error::{CtlError, DaemonError, Operation};
pub use request::{Intent, Plan, Request, SpeedSpec};
pub use reset::{hard_reset, HARD_RESET_RATES};
pub use session::Session;
