//! Byte-level access to a receiver
//!
//! [`DeviceLink`] is what the hunter and the control path need from a device:
//! async reads and writes, a drain (`flush`, which waits until queued output
//! has left the UART), and control over the local line parameters.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use gps_protocol::{LineSettings, Parity, StopBits};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::debug;

use crate::error::DetectError;

/// A bidirectional byte stream to a receiver with configurable line settings
pub trait DeviceLink: AsyncRead + AsyncWrite + Unpin {
    /// Device path, for reports
    fn path(&self) -> &str;

    /// Current local line settings
    fn line_settings(&self) -> LineSettings;

    /// Reconfigure the local end of the line
    fn set_line_settings(&mut self, line: LineSettings) -> Result<(), DetectError>;
}

fn serial_parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::Even => tokio_serial::Parity::Even,
    }
}

fn serial_stop_bits(stop_bits: StopBits) -> tokio_serial::StopBits {
    match stop_bits {
        StopBits::One => tokio_serial::StopBits::One,
        StopBits::Two => tokio_serial::StopBits::Two,
    }
}

/// A receiver attached to a local serial port
pub struct SerialLink {
    path: String,
    line: LineSettings,
    stream: SerialStream,
}

impl SerialLink {
    /// Open `path` in raw mode with the given line settings
    ///
    /// Opening never writes to the device.
    pub fn open(path: &str, line: LineSettings) -> Result<Self, DetectError> {
        debug!("Opening {} at {}", path, line);

        let stream = tokio_serial::new(path, line.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(serial_parity(line.parity))
            .stop_bits(serial_stop_bits(line.stop_bits))
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open_native_async()
            .map_err(|e| DetectError::OpenFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            path: path.to_string(),
            line,
            stream,
        })
    }
}

impl DeviceLink for SerialLink {
    fn path(&self) -> &str {
        &self.path
    }

    fn line_settings(&self) -> LineSettings {
        self.line
    }

    fn set_line_settings(&mut self, line: LineSettings) -> Result<(), DetectError> {
        debug!("Setting {} to {}", self.path, line);
        self.stream.set_baud_rate(line.baud_rate)?;
        self.stream.set_parity(serial_parity(line.parity))?;
        self.stream.set_stop_bits(serial_stop_bits(line.stop_bits))?;
        self.line = line;
        Ok(())
    }
}

impl AsyncRead for SerialLink {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for SerialLink {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}
