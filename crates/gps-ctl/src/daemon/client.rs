//! Bounded request/response client
//!
//! [`DaemonClient::query`] ships one command and then waits in short,
//! fixed-length slices for an acceptable response. The deadline is measured
//! from the start of the call and never extended.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::{timeout, Instant};
use tracing::{debug, error, trace, warn};

use super::response::{DeviceReport, Expect, Response};
use super::WATCH_COMMAND;
use crate::error::DaemonError;

/// Longest single wait for the connection to become readable
pub const QUERY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A connection to the daemon and what it has told us so far
pub struct DaemonClient<S> {
    stream: BufReader<S>,
    /// Bytes of a line still being received
    pending: Vec<u8>,
    devices: Vec<DeviceReport>,
    device: DeviceReport,
    poll_interval: Duration,
}

impl<S> DaemonClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            pending: Vec::new(),
            devices: Vec::new(),
            device: DeviceReport::default(),
            poll_interval: QUERY_POLL_INTERVAL,
        }
    }

    /// Latest device list
    pub fn devices(&self) -> &[DeviceReport] {
        &self.devices
    }

    /// Latest single-device report
    pub fn device(&self) -> &DeviceReport {
        &self.device
    }

    pub fn set_device(&mut self, report: DeviceReport) {
        self.device = report;
    }

    /// Ship `command` and wait for a response `expect` accepts
    ///
    /// Fails immediately on a write failure or an error response, and with
    /// [`DaemonError::TimedOut`] once more than `timeout_secs` have elapsed
    /// without an acceptable response.
    pub async fn query(
        &mut self,
        expect: Expect,
        timeout_secs: u64,
        command: &str,
    ) -> Result<Response, DaemonError> {
        self.send(command).await?;

        let started = Instant::now();
        let limit = Duration::from_secs(timeout_secs);
        loop {
            debug!("Waiting...");
            let response = match self.next_response().await {
                Ok(Some(response)) => Some(response),
                Ok(None) => None,
                Err(e) => {
                    error!("Wait failed: {}", e);
                    return Err(e);
                }
            };

            if let Some(response) = response {
                if let Response::Error { message } = &response {
                    error!("Error '{}'", message);
                    return Err(DaemonError::Rejected {
                        message: message.clone(),
                    });
                }
                if expect.accepts(&response) {
                    return Ok(response);
                }
            }

            if started.elapsed() > limit {
                warn!("No acceptable response to {} in {} seconds", command.trim_end(), timeout_secs);
                return Err(DaemonError::TimedOut {
                    seconds: timeout_secs,
                });
            }
        }
    }

    /// Subscribe to JSON reports
    pub async fn watch(&mut self) -> Result<(), DaemonError> {
        self.send(WATCH_COMMAND).await
    }

    /// Read reports until the daemon reports on `path`
    ///
    /// The returned report may still lack a driver. Gives up after `device_count` device reports for other paths, or when
    /// `timeout_secs` have elapsed.
    pub async fn wait_for_device(
        &mut self,
        path: &str,
        device_count: usize,
        timeout_secs: u64,
    ) -> Result<DeviceReport, DaemonError> {
        let started = Instant::now();
        let limit = Duration::from_secs(timeout_secs);
        let mut remaining = device_count;

        while remaining > 0 {
            if let Some(Response::Device(report)) = self.next_response().await? {
                remaining -= 1;
                if report.path == path {
                    return Ok(report);
                }
            }
            if started.elapsed() > limit {
                return Err(DaemonError::TimedOut {
                    seconds: timeout_secs,
                });
            }
        }
        Err(DaemonError::Closed)
    }

    async fn send(&mut self, command: &str) -> Result<(), DaemonError> {
        let mut line = command.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }

        let writer = self.stream.get_mut();
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(DaemonError::WriteFailed)?;
        writer.flush().await.map_err(DaemonError::WriteFailed)?;
        debug!("Wrote {}", line.trim_end());
        Ok(())
    }

    /// Wait one poll interval for a complete line
    ///
    /// `Ok(None)` means nothing complete arrived in time.
    async fn next_response(&mut self) -> Result<Option<Response>, DaemonError> {
        loop {
            // read_until keeps partial input in `pending` if the wait expires
            match timeout(self.poll_interval, self.stream.read_until(b'\n', &mut self.pending)).await {
                Err(_) => return Ok(None),
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Ok(Err(e)) => return Err(DaemonError::Wait(e)),
                Ok(Ok(0)) => return Err(DaemonError::Closed),
                Ok(Ok(_)) => {}
            }
            if !self.pending.ends_with(b"\n") {
                // End of stream in the middle of a line
                return Err(DaemonError::Closed);
            }

            let line = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            if line.trim().is_empty() {
                continue;
            }
            trace!("Daemon said {}", line.trim_end());

            let response = Response::parse(&line);
            self.absorb(&response);
            return Ok(Some(response));
        }
    }

    fn absorb(&mut self, response: &Response) {
        match response {
            Response::Devices { devices } => {
                self.devices = devices.clone();
                if let [only] = devices.as_slice() {
                    self.device = only.clone();
                }
            }
            Response::Device(report) => {
                if let Some(known) = self.devices.iter_mut().find(|d| d.path == report.path) {
                    *known = report.clone();
                }
                self.device = report.clone();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::{ResponseMask, DEVICES_COMMAND};
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test(start_paused = true)]
    async fn test_query_times_out_on_silence() {
        let (client_end, _server_end) = duplex(1024);
        let mut client = DaemonClient::new(client_end);

        let started = Instant::now();
        let err = client
            .query(Expect::Classes(ResponseMask::DEVICELIST), 3, DEVICES_COMMAND)
            .await
            .unwrap_err();

        assert!(matches!(err, DaemonError::TimedOut { seconds: 3 }));
        // Deadline is checked once per poll interval
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_error_accepts_first_response() {
        let (client_end, mut server_end) = duplex(1024);
        let mut client = DaemonClient::new(client_end);
        server_end
            .write_all(b"{\"class\":\"VERSION\",\"release\":\"3.25\"}\n")
            .await
            .unwrap();

        let response = client
            .query(Expect::NonError, 8, r#"?DEVICE={"path":"/dev/ttyUSB0","native":0}"#)
            .await
            .unwrap();
        assert!(matches!(response, Response::Version { .. }));

        let mut sent = vec![0u8; 64];
        let n = server_end.read(&mut sent).await.unwrap();
        assert_eq!(&sent[..n], b"?DEVICE={\"path\":\"/dev/ttyUSB0\",\"native\":0}\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_fails_immediately() {
        let (client_end, mut server_end) = duplex(1024);
        let mut client = DaemonClient::new(client_end);
        server_end
            .write_all(b"{\"class\":\"ERROR\",\"message\":\"no such device\"}\n{\"class\":\"DEVICE\"}\n")
            .await
            .unwrap();

        let err = client
            .query(Expect::Classes(ResponseMask::DEVICE), 8, "?DEVICE={}")
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::Rejected { message } if message == "no such device"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skips_other_classes_and_absorbs_devices() {
        let (client_end, mut server_end) = duplex(4096);
        let mut client = DaemonClient::new(client_end);
        server_end
            .write_all(
                concat!(
                    "{\"class\":\"VERSION\",\"release\":\"3.25\"}\n",
                    "{\"class\":\"DEVICES\",\"devices\":[{\"path\":\"/dev/a\",\"driver\":\"SiRF\",\"bps\":4800},",
                    "{\"path\":\"/dev/b\",\"bps\":9600}]}\n",
                )
                .as_bytes(),
            )
            .await
            .unwrap();

        client
            .query(Expect::Classes(ResponseMask::DEVICELIST), 8, DEVICES_COMMAND)
            .await
            .unwrap();
        assert_eq!(client.devices().len(), 2);
        assert_eq!(client.devices()[1].bps, 9600);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_line_survives_poll_expiry() {
        let (client_end, mut server_end) = duplex(1024);
        let mut client = DaemonClient::new(client_end);

        let reader = tokio::spawn(async move {
            client
                .query(Expect::Classes(ResponseMask::DEVICE), 8, "?DEVICE={}")
                .await
        });
        server_end.write_all(b"{\"class\":\"DEV").await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        server_end.write_all(b"ICE\",\"path\":\"/dev/a\"}\n").await.unwrap();

        let response = reader.await.unwrap().unwrap();
        assert!(matches!(response, Response::Device(report) if report.path == "/dev/a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_connection() {
        let (client_end, server_end) = duplex(1024);
        let mut client = DaemonClient::new(client_end);
        drop(server_end);

        let err = client
            .query(Expect::NonError, 8, DEVICES_COMMAND)
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::WriteFailed(_) | DaemonError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_device() {
        let (client_end, mut server_end) = duplex(4096);
        let mut client = DaemonClient::new(client_end);
        server_end
            .write_all(
                concat!(
                    "{\"class\":\"WATCH\",\"enable\":true}\n",
                    "{\"class\":\"DEVICE\",\"path\":\"/dev/b\",\"driver\":\"u-blox\"}\n",
                    "{\"class\":\"DEVICE\",\"path\":\"/dev/a\",\"driver\":\"SiRF\",\"bps\":4800}\n",
                )
                .as_bytes(),
            )
            .await
            .unwrap();

        client.watch().await.unwrap();
        let report = client.wait_for_device("/dev/a", 2, 8).await.unwrap();
        assert_eq!(report.driver, "SiRF");
    }
}
