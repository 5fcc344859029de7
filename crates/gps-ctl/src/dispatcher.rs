//! Path selection and operation sequencing
//!
//! The daemon is tried first unless the request only makes sense against the
//! hardware (raw control, echo, forced direct access). When the daemon
//! cannot be reached the request falls back to the direct path: open the
//! device, hunt for its protocol, then run the operations through the
//! [`ControlAdapter`].
//!
//! Operation failures are collected in the [`Outcome`] and do not stop the
//! remaining operations. Fatal errors (device I/O, hunt timeout, a dead
//! daemon connection) end the run immediately.

use std::io::Write;
use std::time::Duration;

use gps_detect::{DetectError, DeviceHunter, DeviceLink, PacketEvent, SerialLink};
use gps_protocol::driver;
use gps_protocol::{LineSettings, WireMode};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, error, info, trace, warn};

use crate::adapter::ControlAdapter;
use crate::context::Context;
use crate::daemon::{DaemonClient, DeviceCommand, Expect, ResponseMask, DEVICES_COMMAND};
use crate::error::{CtlError, DaemonError};
use crate::request::{Intent, Plan, Request};
use crate::reset::{hard_reset, HARD_RESET_RATES};
use crate::session::{EchoSink, Session};

/// Where connections and devices come from
#[allow(async_fn_in_trait)]
pub trait Backend {
    type Daemon: AsyncRead + AsyncWrite + Unpin;
    type Link: DeviceLink;

    /// Connect to the daemon named by `context`
    async fn connect_daemon(&mut self, context: &Context) -> Result<Self::Daemon, DaemonError>;

    /// Open a device without writing to it
    fn open_device(&mut self, path: &str, line: LineSettings) -> Result<Self::Link, DetectError>;

    /// Destination for echoed control bytes
    fn echo_sink(&mut self) -> EchoSink;
}

/// TCP to the daemon, real serial ports, stdout for echo
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBackend;

impl Backend for SystemBackend {
    type Daemon = TcpStream;
    type Link = SerialLink;

    async fn connect_daemon(&mut self, context: &Context) -> Result<TcpStream, DaemonError> {
        let addr = context.daemon_addr();
        let connected =
            tokio::time::timeout(Duration::from_secs(context.timeout), TcpStream::connect(addr.as_str()))
                .await;
        match connected {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(DaemonError::Connect { addr, source }),
            Err(_) => Err(DaemonError::Connect {
                addr,
                source: std::io::ErrorKind::TimedOut.into(),
            }),
        }
    }

    fn open_device(&mut self, path: &str, line: LineSettings) -> Result<SerialLink, DetectError> {
        SerialLink::open(path, line)
    }

    fn echo_sink(&mut self) -> EchoSink {
        Box::new(tokio::io::stdout())
    }
}

/// Result of a run that did not hit a fatal error
#[derive(Debug, Default)]
pub struct Outcome {
    /// Operations that failed, in order
    pub failures: Vec<CtlError>,
}

impl Outcome {
    fn fail(&mut self, err: CtlError) {
        error!("{}", err);
        self.failures.push(err);
    }

    /// Record a non-fatal failure, pass a fatal one through
    fn absorb(&mut self, result: Result<(), CtlError>) -> Result<(), CtlError> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                self.fail(e);
                Ok(())
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Process exit status: 0 on success, 1 if any operation failed
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

/// Chooses the access path and runs the requested operations
pub struct CommandDispatcher<B, W> {
    context: Context,
    backend: B,
    out: W,
    adapter: ControlAdapter,
}

impl<B, W> CommandDispatcher<B, W>
where
    B: Backend,
    W: Write,
{
    /// Reports go to `out`
    pub fn new(context: Context, backend: B, out: W) -> Self {
        Self {
            context,
            backend,
            out,
            adapter: ControlAdapter::new(),
        }
    }

    pub fn with_adapter(mut self, adapter: ControlAdapter) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Validate `request` and carry it out
    pub async fn run(&mut self, request: &Request) -> Result<Outcome, CtlError> {
        let plan = request.plan()?;

        if plan.wants_daemon() {
            match self.backend.connect_daemon(&self.context).await {
                Ok(stream) => return self.run_daemon(&plan, DaemonClient::new(stream)).await,
                Err(e) => warn!("{}", e),
            }
        }

        if plan.intent == Some(Intent::Reset) {
            return self.run_reset(&plan).await;
        }
        self.run_direct(&plan).await
    }

    async fn run_daemon<S>(
        &mut self,
        plan: &Plan,
        mut client: DaemonClient<S>,
    ) -> Result<Outcome, CtlError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let timeout = self.context.timeout;

        client
            .query(Expect::Classes(ResponseMask::DEVICELIST), timeout, DEVICES_COMMAND)
            .await
            .map_err(|e| daemon_failure("no DEVICES response received", e))?;

        let devices = client.devices().to_vec();
        if devices.is_empty() {
            return Err(CtlError::Protocol("no devices connected".into()));
        }
        if devices.len() > 1 && plan.device.is_none() {
            return Err(CtlError::User("multiple devices and no device specified".into()));
        }
        info!("{} device(s) found", devices.len());

        let mut report = match plan.device.as_deref() {
            None => devices[0].clone(),
            Some(path) => devices
                .iter()
                .find(|d| d.path == path)
                .cloned()
                .ok_or_else(|| CtlError::User("specified device not found in device list".into()))?,
        };
        client.set_device(report.clone());

        if report.driver.is_empty() {
            client
                .watch()
                .await
                .map_err(|e| daemon_failure("stream set failed", e))?;
            report = client
                .wait_for_device(&report.path, devices.len(), timeout)
                .await
                .map_err(|e| daemon_failure("data read failed", e))?;
        }

        let path = report.path.clone();
        if report.driver.is_empty() {
            self.report(format_args!("{} can't be identified.", path))?;
            return Ok(Outcome::default());
        }

        if !plan.has_control_op() {
            self.report(format_args!(
                "{} identified as {} at {}",
                path, report.driver, report.bps
            ))?;
        }

        if plan.intent == Some(Intent::Reset) {
            info!("cannot reset with the daemon running");
            return Ok(Outcome::default());
        }

        let mut outcome = Outcome::default();

        // The daemon answers a mode change from the current packet type, which
        // may not have switched yet, so any non-error response counts
        if let Some(mode) = plan.wire_mode() {
            let command = DeviceCommand {
                native: Some(u8::from(mode == WireMode::Binary)),
                ..DeviceCommand::new(&path)
            }
            .render()?;
            let label = match mode {
                WireMode::Nmea => "NMEA",
                WireMode::Binary => "native mode",
            };
            match client.query(Expect::NonError, timeout, &command).await {
                Ok(_) => info!("{} mode change succeeded", path),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => outcome.fail(CtlError::Protocol(format!(
                    "{} mode change to {} failed: {}",
                    path, label, e
                ))),
            }
        }

        if let Some(spec) = plan.speed {
            let mut command = DeviceCommand {
                bps: Some(spec.baud_rate),
                ..DeviceCommand::new(&path)
            };
            if let Some((parity, stop_bits)) = spec.framing {
                command.parity = Some(parity.as_char().to_string());
                command.stopbits = Some(stop_bits.count());
            }
            let command = command.render()?;
            if let Err(e) = client
                .query(Expect::Classes(ResponseMask::DEVICE), timeout, &command)
                .await
            {
                if e.is_fatal() {
                    return Err(e.into());
                }
                debug!("Speed query for {} failed: {}", path, e);
            }

            if client.device().bps == spec.baud_rate {
                info!("{} change to {} succeeded", path, spec);
            } else {
                outcome.fail(CtlError::Protocol(format!(
                    "{} driver won't support {}",
                    path, spec
                )));
            }
        }

        if let Some(cycle) = plan.rate {
            let command = DeviceCommand {
                cycle: Some(cycle),
                ..DeviceCommand::new(&path)
            }
            .render()?;
            match client
                .query(Expect::Classes(ResponseMask::DEVICE), timeout, &command)
                .await
            {
                Ok(_) => info!("{} cycle change to {} succeeded", path, cycle),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => outcome.fail(CtlError::Protocol(format!(
                    "{} cycle change failed: {}",
                    path, e
                ))),
            }
        }

        Ok(outcome)
    }

    async fn run_reset(&mut self, plan: &Plan) -> Result<Outcome, CtlError> {
        let (Some(path), Some(driver)) = (plan.device.as_deref(), plan.forced) else {
            return Err(CtlError::User(
                "device and type must be specified for the reset operation".into(),
            ));
        };

        let link = self.backend.open_device(path, LineSettings::n81(4800))?;
        let mut session = Session::with_link(self.context.clone(), link);
        session.bind_driver(driver);
        hard_reset(&mut session, &HARD_RESET_RATES).await?;

        info!("{} reset to 4800N1 NMEA", path);
        Ok(Outcome::default())
    }

    async fn run_direct(&mut self, plan: &Plan) -> Result<Outcome, CtlError> {
        let mut context = self.context.clone();
        if plan.echo {
            context.read_only = true;
        }

        // A forced type with echo needs no hardware at all
        let mut session = if plan.forced.is_some() && plan.echo {
            Session::detached(context, plan.device.clone().unwrap_or_default())
        } else {
            self.identify(plan, context).await?
        };

        let device = session.device();
        self.report(format_args!(
            "{} identified as a {} at {} baud.",
            device.path,
            device.id_string(),
            device.baud_rate
        ))?;

        if !plan.has_control_op() {
            return Ok(Outcome::default());
        }

        if plan.echo {
            session.set_echo(self.backend.echo_sink());
        }
        if let Some(forced) = plan.forced {
            session.bind_driver(forced);
        }

        let path = session.device().path.clone();
        let mut outcome = Outcome::default();

        if let Some(mode) = plan.wire_mode() {
            let lifted = lift_for_echo(plan, &mut session);
            let result = self.adapter.mode_switch(&mut session, mode).await;
            restore_read_only(&mut session, lifted);
            outcome.absorb(result)?;
        }

        if let Some(spec) = plan.speed {
            let current = if plan.echo {
                LineSettings::default()
            } else {
                session.line()
            };
            let target = spec.line(current);
            let lifted = lift_for_echo(plan, &mut session);
            let result = self.adapter.speed_switch(&mut session, target).await;
            restore_read_only(&mut session, lifted);
            match result {
                Ok(true) => info!("{} change to {} succeeded", path, target),
                Ok(false) => outcome.fail(CtlError::Protocol(format!(
                    "{} driver won't support {}",
                    path, target
                ))),
                Err(e) => outcome.absorb(Err(e))?,
            }
        }

        if let Some(cycle) = plan.rate {
            let lifted = lift_for_echo(plan, &mut session);
            let result = self.adapter.rate_switch(&mut session, cycle).await;
            restore_read_only(&mut session, lifted);
            match result {
                Ok(true) => info!("{} cycle change to {} succeeded", path, cycle),
                Ok(false) => outcome.fail(CtlError::Protocol("rate switch failed".into())),
                Err(e) => outcome.absorb(Err(e))?,
            }
        }

        if let Some(control) = &plan.control {
            let lifted = lift_for_echo(plan, &mut session);
            let result = self.adapter.control_send(&mut session, control).await;
            restore_read_only(&mut session, lifted);
            match result {
                Ok(true) => debug!("{} control string sent", path),
                Ok(false) => {
                    outcome.fail(CtlError::Protocol("control transmission failed".into()))
                }
                Err(e) => outcome.absorb(Err(e))?,
            }
        }

        Ok(outcome)
    }

    /// Open the device and hunt until its protocol is known
    async fn identify(
        &mut self,
        plan: &Plan,
        context: Context,
    ) -> Result<Session<B::Link>, CtlError> {
        let path = plan.device.as_deref().ok_or_else(|| {
            CtlError::User("device must be specified for low-level access".into())
        })?;

        let mut link = self
            .backend
            .open_device(path, LineSettings::n81(context.initial_baud()))?;
        info!("device {} activated", path);

        let hunter = DeviceHunter::new(context.hunt_config());
        let hunted = hunter
            .hunt(&mut link, &mut |event: &PacketEvent| trace!("{:?}", event))
            .await?;

        let mut session = Session::with_link(context, link);
        session.apply_hunt(&hunted);
        debug!(
            "{} looks like a {} at {}",
            path,
            session.device().id_string(),
            hunted.line.baud_rate
        );

        if let Some(forced) = plan.forced {
            let found = hunted.driver.type_name();
            if found != driver::generic().type_name() && found != forced.type_name() {
                error!(
                    "'{}' doesn't match non-generic type '{}' of selected device",
                    forced.type_name(),
                    found
                );
            }
        }

        Ok(session)
    }

    fn report(&mut self, line: std::fmt::Arguments<'_>) -> Result<(), CtlError> {
        writeln!(self.out, "{}", line).map_err(|source| CtlError::Device {
            path: "output".into(),
            source,
        })
    }
}

/// Echoed bytes never reach the device, so an echo run lifts read-only for
/// the one operation about to print
fn lift_for_echo<L: DeviceLink>(plan: &Plan, session: &mut Session<L>) -> Option<bool> {
    plan.echo.then(|| session.lift_read_only())
}

fn restore_read_only<L: DeviceLink>(session: &mut Session<L>, lifted: Option<bool>) {
    if let Some(previous) = lifted {
        session.restore_read_only(previous);
    }
}

fn daemon_failure(context: &str, err: DaemonError) -> CtlError {
    if err.is_fatal() {
        CtlError::Daemon(err)
    } else {
        CtlError::Protocol(format!("{context}: {err}"))
    }
}
