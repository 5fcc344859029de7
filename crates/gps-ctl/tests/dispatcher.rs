//! End-to-end runs of the dispatcher against simulated devices and daemons

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll};

use gps_ctl::session::EchoSink;
use gps_ctl::{Backend, CommandDispatcher, Context, CtlError, DaemonError, Operation, Request};
use gps_detect::DetectError;
use gps_protocol::driver::sirf::Sirf;
use gps_protocol::{LineSettings, ModeSwitcher, WireMode};
use gps_sim::{
    DaemonRule, FakeDaemon, LinkEvent, LinkJournal, MockLink, ReceiverKind, VirtualReceiver,
};
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;

const DEVICE: &str = "/dev/ttyUSB0";

/// Collects echoed bytes
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[derive(Default)]
struct TestBackend {
    daemon_port: Option<u16>,
    links: HashMap<String, MockLink>,
    echo: SharedBuffer,
    connects: usize,
    opens: usize,
}

impl TestBackend {
    fn with_link(link: MockLink) -> (Self, LinkJournal) {
        let journal = link.journal();
        let mut backend = Self::default();
        backend.links.insert(DEVICE.to_string(), link);
        (backend, journal)
    }

    fn with_daemon(daemon: &FakeDaemon) -> Self {
        Self {
            daemon_port: Some(daemon.port()),
            ..Default::default()
        }
    }
}

impl Backend for TestBackend {
    type Daemon = TcpStream;
    type Link = MockLink;

    async fn connect_daemon(&mut self, context: &Context) -> Result<TcpStream, DaemonError> {
        self.connects += 1;
        let refused = || DaemonError::Connect {
            addr: context.daemon_addr(),
            source: io::ErrorKind::ConnectionRefused.into(),
        };
        let port = self.daemon_port.ok_or_else(refused)?;
        TcpStream::connect(("127.0.0.1", port))
            .await
            .map_err(|_| refused())
    }

    fn open_device(&mut self, path: &str, _line: LineSettings) -> Result<MockLink, DetectError> {
        self.opens += 1;
        self.links
            .remove(path)
            .ok_or_else(|| DetectError::OpenFailed {
                path: path.to_string(),
                reason: "no such device".into(),
            })
    }

    fn echo_sink(&mut self) -> EchoSink {
        Box::new(self.echo.clone())
    }
}

fn receiver_link(kind: ReceiverKind, baseline: usize) -> MockLink {
    let mut receiver = VirtualReceiver::new(kind);
    receiver.power_up(baseline);
    let mut link = MockLink::new(DEVICE, 4800);
    receiver.drain_into(&mut link, 4800);
    link
}

fn sirf() -> ReceiverKind {
    ReceiverKind::Sirf {
        version: "GSW3.2.4".into(),
    }
}

fn output<B: Backend>(dispatcher: &CommandDispatcher<B, Vec<u8>>) -> String {
    String::from_utf8_lossy(dispatcher.output()).into_owned()
}

fn devices_rule(devices: &[serde_json::Value]) -> DaemonRule {
    DaemonRule::new("?DEVICES;", [FakeDaemon::devices_line(devices)])
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_conflicting_modes_touch_nothing() {
    let mut dispatcher =
        CommandDispatcher::new(Context::default(), TestBackend::default(), Vec::new());
    let request = Request {
        device: Some(DEVICE.into()),
        to_nmea: true,
        to_binary: true,
        ..Default::default()
    };

    let err = dispatcher.run(&request).await.unwrap_err();

    assert!(matches!(err, CtlError::User(_)));
    assert_eq!(dispatcher.backend().connects, 0);
    assert_eq!(dispatcher.backend().opens, 0);
    assert!(dispatcher.output().is_empty());
}

#[tokio::test]
async fn test_bad_speed_spec_touches_nothing() {
    let mut dispatcher =
        CommandDispatcher::new(Context::default(), TestBackend::default(), Vec::new());
    let request = Request {
        device: Some(DEVICE.into()),
        speed: Some("9600:8N3".into()),
        ..Default::default()
    };

    assert!(matches!(
        dispatcher.run(&request).await,
        Err(CtlError::User(_))
    ));
    assert_eq!(dispatcher.backend().connects, 0);
}

// =============================================================================
// Direct access
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_direct_identifies_sirf_after_daemon_refused() {
    let (backend, journal) = TestBackend::with_link(receiver_link(sirf(), 3));
    let mut dispatcher = CommandDispatcher::new(Context::default(), backend, Vec::new());
    let request = Request {
        device: Some(DEVICE.into()),
        ..Default::default()
    };

    let outcome = dispatcher.run(&request).await.unwrap();

    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(dispatcher.backend().connects, 1);
    assert_eq!(
        output(&dispatcher),
        "/dev/ttyUSB0 identified as a SiRF at 4800 baud.\n"
    );
    assert!(journal.written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_direct_mode_switch_settles() {
    let (backend, journal) = TestBackend::with_link(receiver_link(sirf(), 2));
    let mut dispatcher = CommandDispatcher::new(Context::default(), backend, Vec::new());
    let request = Request {
        device: Some(DEVICE.into()),
        to_binary: true,
        force_direct: true,
        ..Default::default()
    };

    let outcome = dispatcher.run(&request).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(dispatcher.backend().connects, 0);
    assert_eq!(
        journal.events(),
        vec![
            LinkEvent::Write(Sirf.mode_switch(WireMode::Binary, LineSettings::n81(4800))),
            LinkEvent::Drain,
            LinkEvent::Drain,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_missing_capability_does_not_stop_other_operations() {
    let (backend, journal) =
        TestBackend::with_link(receiver_link(ReceiverKind::GenericNmea, 16));
    let mut dispatcher = CommandDispatcher::new(Context::default(), backend, Vec::new());
    let request = Request {
        device: Some(DEVICE.into()),
        to_nmea: true,
        control: Some("PSRF105,1".into()),
        ..Default::default()
    };

    let outcome = dispatcher.run(&request).await.unwrap();

    assert_eq!(outcome.exit_code(), 1);
    assert!(matches!(
        outcome.failures.as_slice(),
        [CtlError::Capability {
            operation: Operation::ModeSwitch,
            ..
        }]
    ));
    assert_eq!(journal.written(), b"$PSRF105,1*3E\r\n");
    assert!(output(&dispatcher).contains("identified as a Generic NMEA at 4800 baud."));
}

#[tokio::test(start_paused = true)]
async fn test_echo_with_forced_type_needs_no_device() {
    let mut dispatcher =
        CommandDispatcher::new(Context::default(), TestBackend::default(), Vec::new());
    let request = Request {
        forced_type: Some("SiRF".into()),
        echo: true,
        to_binary: true,
        ..Default::default()
    };

    let outcome = dispatcher.run(&request).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(dispatcher.backend().connects, 0);
    assert_eq!(dispatcher.backend().opens, 0);
    assert_eq!(
        dispatcher.backend().echo.contents(),
        b"$PSRF100,0,4800,8,1,0*0F\r\n"
    );
}

#[tokio::test(start_paused = true)]
async fn test_echo_without_hardware_reports_unknown_device() {
    let mut dispatcher =
        CommandDispatcher::new(Context::default(), TestBackend::default(), Vec::new());
    let request = Request {
        device: Some(DEVICE.into()),
        forced_type: Some("SiRF".into()),
        echo: true,
        to_binary: true,
        ..Default::default()
    };

    dispatcher.run(&request).await.unwrap();

    assert_eq!(dispatcher.backend().opens, 0);
    assert_eq!(
        output(&dispatcher),
        "/dev/ttyUSB0 identified as a unknown, at 4800 baud.\n"
    );
}

#[tokio::test(start_paused = true)]
async fn test_read_only_settings_block_direct_control() {
    let (backend, journal) = TestBackend::with_link(receiver_link(sirf(), 2));
    let context: Context = serde_json::from_str(r#"{"read_only": true}"#).unwrap();
    let mut dispatcher = CommandDispatcher::new(context, backend, Vec::new());
    let request = Request {
        device: Some(DEVICE.into()),
        to_binary: true,
        force_direct: true,
        ..Default::default()
    };

    let outcome = dispatcher.run(&request).await.unwrap();

    assert_eq!(outcome.exit_code(), 1);
    assert!(matches!(outcome.failures.as_slice(), [CtlError::ReadOnly]));
    assert!(journal.written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_echo_after_hunt_leaves_device_untouched() {
    let (backend, journal) = TestBackend::with_link(receiver_link(sirf(), 1));
    let mut dispatcher = CommandDispatcher::new(Context::default(), backend, Vec::new());
    let request = Request {
        device: Some(DEVICE.into()),
        echo: true,
        speed: Some("9600".into()),
        ..Default::default()
    };

    let outcome = dispatcher.run(&request).await.unwrap();

    assert!(outcome.is_success());
    assert!(journal.written().is_empty());
    let echoed = dispatcher.backend().echo.contents();
    assert_eq!(&echoed[..2], &[0xA0, 0xA2]);
}

#[tokio::test(start_paused = true)]
async fn test_hunt_timeout_is_fatal() {
    let (backend, _journal) = TestBackend::with_link(MockLink::new(DEVICE, 4800));
    let context = Context {
        timeout: 2,
        ..Default::default()
    };
    let mut dispatcher = CommandDispatcher::new(context, backend, Vec::new());
    let request = Request {
        device: Some(DEVICE.into()),
        force_direct: true,
        ..Default::default()
    };

    let err = dispatcher.run(&request).await.unwrap_err();

    assert!(matches!(
        err,
        CtlError::Detect(DetectError::TimedOut { seconds: 2 })
    ));
    assert!(err.is_fatal());
    assert!(dispatcher.output().is_empty());
}

#[tokio::test]
async fn test_direct_needs_device() {
    let mut dispatcher =
        CommandDispatcher::new(Context::default(), TestBackend::default(), Vec::new());
    let request = Request {
        force_direct: true,
        ..Default::default()
    };

    assert!(matches!(
        dispatcher.run(&request).await,
        Err(CtlError::User(_))
    ));
    assert_eq!(dispatcher.backend().opens, 0);
}

#[tokio::test]
async fn test_reset_without_daemon() {
    let (backend, journal) = TestBackend::with_link(MockLink::new(DEVICE, 4800));
    let mut dispatcher = CommandDispatcher::new(Context::default(), backend, Vec::new());
    let request = Request {
        device: Some(DEVICE.into()),
        forced_type: Some("SiRF".into()),
        reset: true,
        ..Default::default()
    };

    let outcome = dispatcher.run(&request).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(dispatcher.backend().connects, 1);
    let events = journal.events();
    let writes = events
        .iter()
        .filter(|e| matches!(e, LinkEvent::Write(_)))
        .count();
    assert_eq!(writes, 7 + 3);
    assert_eq!(journal.drains(), 7);
    assert_eq!(
        events.last(),
        Some(&LinkEvent::Write(
            Sirf.mode_switch(WireMode::Nmea, LineSettings::n81(4800))
        ))
    );
}

#[tokio::test]
async fn test_reset_needs_type() {
    let (backend, journal) = TestBackend::with_link(MockLink::new(DEVICE, 4800));
    let mut dispatcher = CommandDispatcher::new(Context::default(), backend, Vec::new());
    let request = Request {
        device: Some(DEVICE.into()),
        reset: true,
        ..Default::default()
    };

    assert!(matches!(
        dispatcher.run(&request).await,
        Err(CtlError::User(_))
    ));
    assert!(journal.events().is_empty());
}

// =============================================================================
// Daemon access
// =============================================================================

#[tokio::test]
async fn test_daemon_identify_only() {
    let daemon = FakeDaemon::spawn(vec![devices_rule(&[FakeDaemon::device(
        DEVICE, "SiRF", 4800,
    )])])
    .await
    .unwrap();
    let mut dispatcher = CommandDispatcher::new(
        Context::default(),
        TestBackend::with_daemon(&daemon),
        Vec::new(),
    );

    let outcome = dispatcher.run(&Request::default()).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(
        output(&dispatcher),
        "/dev/ttyUSB0 identified as SiRF at 4800\n"
    );
    assert_eq!(daemon.requests(), vec!["?DEVICES;".to_string()]);
    assert_eq!(dispatcher.backend().opens, 0);
}

#[tokio::test]
async fn test_daemon_mode_switch() {
    let daemon = FakeDaemon::spawn(vec![
        devices_rule(&[FakeDaemon::device(DEVICE, "SiRF", 4800)]),
        DaemonRule::new(
            "?DEVICE=",
            [FakeDaemon::device(DEVICE, "SiRF", 4800).to_string()],
        ),
    ])
    .await
    .unwrap();
    let mut dispatcher = CommandDispatcher::new(
        Context::default(),
        TestBackend::with_daemon(&daemon),
        Vec::new(),
    );
    let request = Request {
        to_binary: true,
        ..Default::default()
    };

    let outcome = dispatcher.run(&request).await.unwrap();

    assert!(outcome.is_success());
    assert!(output(&dispatcher).is_empty());
    assert_eq!(
        daemon.requests(),
        vec![
            "?DEVICES;".to_string(),
            r#"?DEVICE={"path":"/dev/ttyUSB0","native":1}"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn test_daemon_error_response_is_reported() {
    let daemon = FakeDaemon::spawn(vec![
        devices_rule(&[FakeDaemon::device(DEVICE, "Generic NMEA", 4800)]),
        DaemonRule::new(
            "?DEVICE=",
            [FakeDaemon::error_line("Device type has no mode switcher")],
        ),
    ])
    .await
    .unwrap();
    let mut dispatcher = CommandDispatcher::new(
        Context::default(),
        TestBackend::with_daemon(&daemon),
        Vec::new(),
    );
    let request = Request {
        to_nmea: true,
        ..Default::default()
    };

    let outcome = dispatcher.run(&request).await.unwrap();

    assert_eq!(outcome.exit_code(), 1);
    assert!(matches!(
        outcome.failures.as_slice(),
        [CtlError::Protocol(_)]
    ));
}

#[tokio::test]
async fn test_daemon_speed_change_is_verified() {
    let daemon = FakeDaemon::spawn(vec![
        devices_rule(&[FakeDaemon::device(DEVICE, "SiRF", 4800)]),
        DaemonRule::new(
            r#"?DEVICE={"path":"/dev/ttyUSB0","bps":9600"#,
            [FakeDaemon::device(DEVICE, "SiRF", 9600).to_string()],
        ),
        DaemonRule::new(
            r#"?DEVICE={"path":"/dev/ttyUSB0","bps":1200"#,
            [FakeDaemon::device(DEVICE, "SiRF", 4800).to_string()],
        ),
    ])
    .await
    .unwrap();

    let mut dispatcher = CommandDispatcher::new(
        Context::default(),
        TestBackend::with_daemon(&daemon),
        Vec::new(),
    );
    let request = Request {
        speed: Some("9600:8N1".into()),
        ..Default::default()
    };
    assert!(dispatcher.run(&request).await.unwrap().is_success());

    let mut dispatcher = CommandDispatcher::new(
        Context::default(),
        TestBackend::with_daemon(&daemon),
        Vec::new(),
    );
    let request = Request {
        speed: Some("1200".into()),
        ..Default::default()
    };
    assert_eq!(dispatcher.run(&request).await.unwrap().exit_code(), 1);

    assert!(daemon.requests().contains(
        &r#"?DEVICE={"path":"/dev/ttyUSB0","bps":9600,"parity":"N","stopbits":1}"#.to_string()
    ));
}

#[tokio::test]
async fn test_daemon_refuses_reset() {
    let daemon = FakeDaemon::spawn(vec![devices_rule(&[FakeDaemon::device(
        DEVICE, "SiRF", 4800,
    )])])
    .await
    .unwrap();
    let mut dispatcher = CommandDispatcher::new(
        Context::default(),
        TestBackend::with_daemon(&daemon),
        Vec::new(),
    );
    let request = Request {
        device: Some(DEVICE.into()),
        forced_type: Some("SiRF".into()),
        reset: true,
        ..Default::default()
    };

    let outcome = dispatcher.run(&request).await.unwrap();

    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(dispatcher.backend().opens, 0);
}

#[tokio::test]
async fn test_daemon_multiple_devices_need_a_path() {
    let daemon = FakeDaemon::spawn(vec![devices_rule(&[
        FakeDaemon::device("/dev/ttyUSB0", "SiRF", 4800),
        FakeDaemon::device("/dev/ttyUSB1", "u-blox", 9600),
    ])])
    .await
    .unwrap();
    let dispatcher_for = |daemon: &FakeDaemon| {
        CommandDispatcher::new(
            Context::default(),
            TestBackend::with_daemon(daemon),
            Vec::new(),
        )
    };

    let mut dispatcher = dispatcher_for(&daemon);
    assert!(matches!(
        dispatcher.run(&Request::default()).await,
        Err(CtlError::User(_))
    ));

    let mut dispatcher = dispatcher_for(&daemon);
    let request = Request {
        device: Some("/dev/ttyUSB1".into()),
        ..Default::default()
    };
    dispatcher.run(&request).await.unwrap();
    assert_eq!(
        output(&dispatcher),
        "/dev/ttyUSB1 identified as u-blox at 9600\n"
    );

    let mut dispatcher = dispatcher_for(&daemon);
    let request = Request {
        device: Some("/dev/ttyS9".into()),
        ..Default::default()
    };
    assert!(matches!(
        dispatcher.run(&request).await,
        Err(CtlError::User(_))
    ));
}

#[tokio::test]
async fn test_daemon_waits_for_identification() {
    let daemon = FakeDaemon::spawn(vec![
        devices_rule(&[FakeDaemon::device(DEVICE, "", 4800)]),
        DaemonRule::new(
            "?WATCH=",
            [
                r#"{"class":"WATCH","enable":true,"json":true}"#.to_string(),
                FakeDaemon::device(DEVICE, "u-blox", 9600).to_string(),
            ],
        ),
    ])
    .await
    .unwrap();
    let mut dispatcher = CommandDispatcher::new(
        Context::default(),
        TestBackend::with_daemon(&daemon),
        Vec::new(),
    );

    dispatcher.run(&Request::default()).await.unwrap();

    assert_eq!(
        output(&dispatcher),
        "/dev/ttyUSB0 identified as u-blox at 9600\n"
    );
}

#[tokio::test]
async fn test_daemon_unidentifiable_device() {
    let daemon = FakeDaemon::spawn(vec![
        devices_rule(&[FakeDaemon::device(DEVICE, "", 4800)]),
        DaemonRule::new(
            "?WATCH=",
            [FakeDaemon::device(DEVICE, "", 4800).to_string()],
        ),
    ])
    .await
    .unwrap();
    let mut dispatcher = CommandDispatcher::new(
        Context::default(),
        TestBackend::with_daemon(&daemon),
        Vec::new(),
    );

    let outcome = dispatcher.run(&Request::default()).await.unwrap();

    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(output(&dispatcher), "/dev/ttyUSB0 can't be identified.\n");
}
