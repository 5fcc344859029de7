//! Capability-checked control operations
//!
//! Each operation looks the capability up on the session's bound driver,
//! writes through the session (so a read-only session refuses) and settles
//! the line afterwards whether or not the write went through.

use std::time::Duration;

use gps_detect::DeviceLink;
use gps_protocol::{LineSettings, WireMode};
use tracing::{debug, info};

use crate::error::{CtlError, Operation};
use crate::session::Session;

/// Pause between the two drains of a settle
pub const SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Invokes driver capabilities against a session
#[derive(Debug, Clone)]
pub struct ControlAdapter {
    settle_delay: Duration,
}

impl Default for ControlAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlAdapter {
    pub fn new() -> Self {
        Self {
            settle_delay: SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }

    /// Drain, give the device time to apply a change, drain again
    pub async fn settle<L: DeviceLink>(&self, session: &mut Session<L>) -> Result<(), CtlError> {
        session.drain().await?;
        tokio::time::sleep(self.settle_delay).await;
        session.drain().await
    }

    /// Switch the receiver between NMEA and its binary protocol
    pub async fn mode_switch<L: DeviceLink>(
        &self,
        session: &mut Session<L>,
        mode: WireMode,
    ) -> Result<(), CtlError> {
        let driver = session.driver();
        let switcher = driver
            .mode_switcher()
            .ok_or_else(|| capability(driver.type_name(), Operation::ModeSwitch))?;

        info!("Switching to mode {}", mode.name());
        let bytes = switcher.mode_switch(mode, session.line());
        self.write_and_settle(session, Some(bytes)).await?;
        Ok(())
    }

    /// Ask the receiver to adopt `target`; `false` if the driver can't express it
    pub async fn speed_switch<L: DeviceLink>(
        &self,
        session: &mut Session<L>,
        target: LineSettings,
    ) -> Result<bool, CtlError> {
        let driver = session.driver();
        let switcher = driver
            .speed_switcher()
            .ok_or_else(|| capability(driver.type_name(), Operation::SpeedSwitch))?;

        let bytes = switcher.speed_switch(target);
        self.write_and_settle(session, bytes).await
    }

    /// Change the report cadence; `false` if the driver rejects the cycle
    pub async fn rate_switch<L: DeviceLink>(
        &self,
        session: &mut Session<L>,
        cycle_secs: f64,
    ) -> Result<bool, CtlError> {
        let driver = session.driver();
        let switcher = driver
            .rate_switcher()
            .ok_or_else(|| capability(driver.type_name(), Operation::RateSwitch))?;

        let bytes = switcher.rate_switch(cycle_secs);
        self.write_and_settle(session, bytes).await
    }

    /// Frame and transmit a raw payload; `false` if it can't be framed
    pub async fn control_send<L: DeviceLink>(
        &self,
        session: &mut Session<L>,
        raw: &[u8],
    ) -> Result<bool, CtlError> {
        let driver = session.driver();
        let sender = driver
            .control_sender()
            .ok_or_else(|| capability(driver.type_name(), Operation::ControlSend))?;

        let bytes = sender.control_frame(raw);
        self.write_and_settle(session, bytes).await
    }

    async fn write_and_settle<L: DeviceLink>(
        &self,
        session: &mut Session<L>,
        bytes: Option<Vec<u8>>,
    ) -> Result<bool, CtlError> {
        let written = match &bytes {
            Some(bytes) => session.write(bytes).await.map(|()| true),
            None => {
                debug!("{} driver produced nothing to send", session.driver().type_name());
                Ok(false)
            }
        };
        let settled = self.settle(session).await;

        let accepted = written?;
        settled?;
        Ok(accepted)
    }
}

fn capability(driver: &'static str, operation: Operation) -> CtlError {
    CtlError::Capability { driver, operation }
}
