//! gpsctl
//!
//! Identifies a GPS receiver and changes its mode, speed or report cycle,
//! going through the daemon when one is running and straight to the serial
//! device otherwise.

mod cli;
mod settings;

use std::process::ExitCode;

use clap::Parser;
use gps_ctl::{CommandDispatcher, CtlError, SystemBackend};
use gps_protocol::driver::{capability_row, DRIVERS};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::Cli;

const CRATES: [&str; 4] = ["gpsctl", "gps_ctl", "gps_detect", "gps_protocol"];

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let context = match settings::load(cli.config.as_deref()) {
        Ok(mut context) => {
            cli.apply(&mut context);
            context
        }
        Err(e) => {
            init_tracing(cli.debug.unwrap_or(0));
            error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(context.debug);

    if cli.list {
        for driver in DRIVERS {
            println!("{}", capability_row(*driver));
        }
        return ExitCode::SUCCESS;
    }

    let mut signals = match signals::Signals::install() {
        Ok(signals) => signals,
        Err(e) => {
            error!("cannot install signal handlers: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let request = cli.request();
    let mut dispatcher = CommandDispatcher::new(context, SystemBackend, std::io::stdout());
    let result = tokio::select! {
        result = dispatcher.run(&request) => result,
        signal = signals.recv() => Err(CtlError::Cancelled(signal)),
    };

    match result {
        Ok(outcome) => ExitCode::from(u8::try_from(outcome.exit_code()).unwrap_or(1)),
        // Interruption by the operator is not a failure
        Err(e @ CtlError::Cancelled(_)) => {
            error!("{}", e);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; otherwise the debug level picks the filter
fn init_tracing(debug: u8) {
    let level = match debug {
        0 => "info",
        1..=4 => "debug",
        _ => "trace",
    };
    let default_filter = CRATES
        .iter()
        .map(|name| format!("{name}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(unix)]
mod signals {
    use tokio::signal::unix::{signal, Signal, SignalKind};

    const SIGINT: i32 = 2;
    const SIGQUIT: i32 = 3;
    const SIGTERM: i32 = 15;

    /// Interrupt, terminate and quit
    pub struct Signals {
        interrupt: Signal,
        terminate: Signal,
        quit: Signal,
    }

    impl Signals {
        pub fn install() -> std::io::Result<Self> {
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
                quit: signal(SignalKind::quit())?,
            })
        }

        /// Number of the first signal to arrive
        pub async fn recv(&mut self) -> i32 {
            tokio::select! {
                _ = self.interrupt.recv() => SIGINT,
                _ = self.terminate.recv() => SIGTERM,
                _ = self.quit.recv() => SIGQUIT,
            }
        }
    }
}

#[cfg(not(unix))]
mod signals {
    const SIGINT: i32 = 2;

    pub struct Signals;

    impl Signals {
        pub fn install() -> std::io::Result<Self> {
            Ok(Self)
        }

        pub async fn recv(&mut self) -> i32 {
            match tokio::signal::ctrl_c().await {
                Ok(()) => SIGINT,
                Err(_) => std::future::pending().await,
            }
        }
    }
}
