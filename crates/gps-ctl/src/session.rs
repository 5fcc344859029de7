//! The live connection to one device
//!
//! A [`Session`] owns at most one open link, carries its own copy of the
//! [`Context`] and is bound to exactly one driver at a time. All writes go
//! through it so that the read-only flag is enforced in a single place.

use gps_detect::{DeviceLink, HuntOutcome};
use gps_protocol::driver::{self, Driver};
use gps_protocol::LineSettings;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::context::Context;
use crate::device::DeviceDescriptor;
use crate::error::CtlError;

/// Destination for echoed control bytes
pub type EchoSink = Box<dyn AsyncWrite + Unpin + Send>;

/// One device, its driver and the settings governing it
pub struct Session<L> {
    context: Context,
    link: Option<L>,
    echo: Option<EchoSink>,
    driver: &'static dyn Driver,
    device: DeviceDescriptor,
}

impl<L: DeviceLink> Session<L> {
    /// Session over an open link, bound to the generic driver
    pub fn with_link(context: Context, link: L) -> Self {
        let mut device = DeviceDescriptor::new(link.path());
        device.set_line(link.line_settings());
        Self {
            context,
            link: Some(link),
            echo: None,
            driver: driver::generic(),
            device,
        }
    }

    /// Session with no hardware behind it, for echo-only requests
    ///
    /// The line is assumed to be at the default 4800N1.
    pub fn detached(context: Context, path: impl Into<String>) -> Self {
        let mut device = DeviceDescriptor::new(path);
        device.set_line(LineSettings::default());
        Self {
            context,
            link: None,
            echo: None,
            driver: driver::generic(),
            device,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    pub fn driver(&self) -> &'static dyn Driver {
        self.driver
    }

    pub fn has_link(&self) -> bool {
        self.link.is_some()
    }

    /// Current line settings as far as the session knows
    pub fn line(&self) -> LineSettings {
        self.link
            .as_ref()
            .map(|link| link.line_settings())
            .unwrap_or_else(|| self.device.line())
    }

    /// Switch to `driver` for subsequent control operations
    pub fn bind_driver(&mut self, driver: &'static dyn Driver) {
        if driver.type_name() != self.driver.type_name() {
            debug!("Binding {} to the {} driver", self.device.path, driver.type_name());
        }
        self.driver = driver;
        self.device.driver = driver.type_name().to_string();
    }

    /// Adopt the identification reached by a hunt
    pub fn apply_hunt(&mut self, outcome: &HuntOutcome) {
        self.driver = outcome.driver;
        self.device.apply_hunt(outcome);
    }

    /// Send writes to `sink` instead of the device
    pub fn set_echo(&mut self, sink: EchoSink) {
        self.echo = Some(sink);
    }

    pub fn read_only(&self) -> bool {
        self.context.read_only
    }

    /// Clear the read-only flag, returning its previous value
    pub fn lift_read_only(&mut self) -> bool {
        std::mem::replace(&mut self.context.read_only, false)
    }

    pub fn restore_read_only(&mut self, previous: bool) {
        self.context.read_only = previous;
    }

    /// Write `bytes` to the echo sink if set, otherwise to the device
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), CtlError> {
        if self.context.read_only {
            return Err(CtlError::ReadOnly);
        }
        trace!("Writing {} bytes to {}: {:02X?}", bytes.len(), self.device.path, bytes);

        let result = if let Some(sink) = self.echo.as_mut() {
            sink.write_all(bytes).await
        } else if let Some(link) = self.link.as_mut() {
            link.write_all(bytes).await
        } else {
            return Err(self.no_device());
        };
        result.map_err(|source| CtlError::Device {
            path: self.device.path.clone(),
            source,
        })
    }

    /// Wait until queued output has been transmitted
    pub async fn drain(&mut self) -> Result<(), CtlError> {
        let result = if let Some(sink) = self.echo.as_mut() {
            sink.flush().await
        } else if let Some(link) = self.link.as_mut() {
            link.flush().await
        } else {
            return Ok(());
        };
        result.map_err(|source| CtlError::Device {
            path: self.device.path.clone(),
            source,
        })
    }

    /// Reconfigure the local end of the line
    pub fn set_line(&mut self, line: LineSettings) -> Result<(), CtlError> {
        if let Some(link) = self.link.as_mut() {
            link.set_line_settings(line)?;
        }
        self.device.set_line(line);
        Ok(())
    }

    fn no_device(&self) -> CtlError {
        CtlError::Device {
            path: self.device.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotConnected, "no device open"),
        }
    }
}
