//! Fake daemon
//!
//! A TCP server that greets each client, records every command line it
//! receives and answers from a list of prefix rules. Unmatched commands get
//! no answer at all, which lets tests exercise client timeouts.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Canned answer for commands starting with `prefix`
#[derive(Debug, Clone)]
pub struct DaemonRule {
    pub prefix: String,
    pub responses: Vec<String>,
}

impl DaemonRule {
    pub fn new<I, S>(prefix: impl Into<String>, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            responses: responses.into_iter().map(Into::into).collect(),
        }
    }
}

/// A mock daemon listening on an ephemeral local port
pub struct FakeDaemon {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl FakeDaemon {
    /// Start serving `rules` to any number of clients
    pub async fn spawn(rules: Vec<DaemonRule>) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let requests: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let rules = Arc::new(rules);

        let requests_clone = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Fake daemon accept failed: {}", e);
                        return;
                    }
                };
                debug!("Fake daemon client {}", peer);
                let rules = Arc::clone(&rules);
                let requests = Arc::clone(&requests_clone);
                tokio::spawn(async move {
                    if let Err(e) = serve_client(stream, &rules, &requests).await {
                        debug!("Fake daemon client ended: {}", e);
                    }
                });
            }
        });

        Ok(Self {
            addr,
            requests,
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Command lines received so far, without line terminators
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Greeting line sent to every client on connect
    pub fn version_line() -> String {
        json!({
            "class": "VERSION",
            "release": "3.25",
            "rev": "3.25",
            "proto_major": 3,
            "proto_minor": 15,
        })
        .to_string()
    }

    /// A `DEVICES` response listing `devices`
    pub fn devices_line(devices: &[serde_json::Value]) -> String {
        json!({ "class": "DEVICES", "devices": devices }).to_string()
    }

    /// A device report for `path`
    pub fn device(path: &str, driver: &str, bps: u32) -> serde_json::Value {
        json!({
            "class": "DEVICE",
            "path": path,
            "driver": driver,
            "bps": bps,
            "parity": "N",
            "stopbits": 1,
            "native": 0,
        })
    }

    /// An `ERROR` response
    pub fn error_line(message: &str) -> String {
        json!({ "class": "ERROR", "message": message }).to_string()
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_client(
    stream: TcpStream,
    rules: &[DaemonRule],
    requests: &Mutex<Vec<String>>,
) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    writer.write_all(FakeDaemon::version_line().as_bytes()).await?;
    writer.write_all(b"\n").await?;

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let command = line.trim_end().to_string();
        if let Ok(mut guard) = requests.lock() {
            guard.push(command.clone());
        }

        let Some(rule) = rules.iter().find(|r| command.starts_with(&r.prefix)) else {
            debug!("Fake daemon ignoring {}", command);
            continue;
        };
        for response in &rule.responses {
            writer.write_all(response.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;
    }
}
