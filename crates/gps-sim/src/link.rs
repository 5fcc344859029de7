//! Scripted device link
//!
//! [`MockLink`] serves queued input chunks and records everything the code
//! under test does to the line. The journal is shared, so a test can keep a
//! [`LinkJournal`] handle after the link itself has been moved into a session.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use gps_detect::{DetectError, DeviceLink};
use gps_protocol::LineSettings;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::trace;

/// Something the code under test did to the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Local line settings changed
    SetLine(LineSettings),
    /// Bytes written to the device
    Write(Vec<u8>),
    /// Output drained
    Drain,
}

/// Shared, clonable record of link events
#[derive(Debug, Clone, Default)]
pub struct LinkJournal {
    events: Arc<Mutex<Vec<LinkEvent>>>,
}

impl LinkJournal {
    fn push(&self, event: LinkEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    /// Snapshot of all events so far
    pub fn events(&self) -> Vec<LinkEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// All bytes written, concatenated
    pub fn written(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LinkEvent::Write(bytes) => Some(bytes),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Number of drains recorded
    pub fn drains(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, LinkEvent::Drain))
            .count()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

/// A [`DeviceLink`] fed from a script
#[derive(Debug)]
pub struct MockLink {
    path: String,
    line: LineSettings,
    /// Input chunks, optionally readable only at one baud rate
    input: VecDeque<(Option<u32>, Vec<u8>)>,
    /// Report end of file once the input runs dry
    closed: bool,
    /// Fail every line change with this reason
    reject_line_changes: Option<String>,
    /// Fail every write with this error
    fail_writes: Option<io::ErrorKind>,
    journal: LinkJournal,
}

impl MockLink {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            line: LineSettings::n81(baud_rate),
            input: VecDeque::new(),
            closed: false,
            reject_line_changes: None,
            fail_writes: None,
            journal: LinkJournal::default(),
        }
    }

    /// Queue bytes readable at any rate
    pub fn push_input(&mut self, bytes: impl Into<Vec<u8>>) {
        self.input.push_back((None, bytes.into()));
    }

    /// Queue bytes readable only while the line is at `baud_rate`
    pub fn push_input_at(&mut self, baud_rate: u32, bytes: impl Into<Vec<u8>>) {
        self.input.push_back((Some(baud_rate), bytes.into()));
    }

    /// Report end of file after the queued input
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn reject_line_changes(&mut self, reason: impl Into<String>) {
        self.reject_line_changes = Some(reason.into());
    }

    /// Refuse writes from now on; drains still succeed
    pub fn fail_writes(&mut self, kind: io::ErrorKind) {
        self.fail_writes = Some(kind);
    }

    /// Handle on the shared event journal
    pub fn journal(&self) -> LinkJournal {
        self.journal.clone()
    }
}

impl DeviceLink for MockLink {
    fn path(&self) -> &str {
        &self.path
    }

    fn line_settings(&self) -> LineSettings {
        self.line
    }

    fn set_line_settings(&mut self, line: LineSettings) -> Result<(), DetectError> {
        if let Some(reason) = &self.reject_line_changes {
            return Err(DetectError::Device {
                path: self.path.clone(),
                reason: reason.clone(),
            });
        }
        self.line = line;
        self.journal.push(LinkEvent::SetLine(line));
        Ok(())
    }
}

impl AsyncRead for MockLink {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let readable = match this.input.front() {
            Some((Some(rate), _)) => *rate == this.line.baud_rate,
            Some((None, _)) => true,
            None => false,
        };

        if readable {
            if let Some((_, mut bytes)) = this.input.pop_front() {
                let n = bytes.len().min(buf.remaining());
                buf.put_slice(&bytes[..n]);
                if n < bytes.len() {
                    let rest = bytes.split_off(n);
                    this.input.push_front((None, rest));
                }
                trace!("MockLink read {} bytes", n);
            }
            return Poll::Ready(Ok(()));
        }

        if this.closed && this.input.is_empty() {
            return Poll::Ready(Ok(()));
        }

        // Callers bound their waits with tokio timers, which wake the task
        Poll::Pending
    }
}

impl AsyncWrite for MockLink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if let Some(kind) = self.fail_writes {
            return Poll::Ready(Err(kind.into()));
        }
        self.journal.push(LinkEvent::Write(buf.to_vec()));
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.journal.push(LinkEvent::Drain);
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
