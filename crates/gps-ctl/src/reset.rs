//! Hard reset
//!
//! A receiver left at an unknown speed in binary mode can be recovered by
//! asking for 4800N1 at every plausible rate, then, at 4800, asking three
//! times for NMEA in case one of the earlier requests was missed.

use gps_detect::DeviceLink;
use gps_protocol::{LineSettings, WireMode};
use tracing::{debug, info};

use crate::error::{CtlError, Operation};
use crate::session::Session;

/// Rates the reset request is sent at, in order
pub const HARD_RESET_RATES: [u32; 7] = [2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// Rate the receiver is asked to settle on
const RESET_LINE: LineSettings = LineSettings::n81(4800);

/// Number of NMEA mode requests sent once at the reset rate
const NMEA_REQUESTS: usize = 3;

/// Walk `rates` asking the bound driver's receiver to return to 4800N1 NMEA
pub async fn hard_reset<L: DeviceLink>(
    session: &mut Session<L>,
    rates: &[u32],
) -> Result<(), CtlError> {
    let driver = session.driver();
    let switcher = driver.speed_switcher().ok_or(CtlError::Capability {
        driver: driver.type_name(),
        operation: Operation::SpeedSwitch,
    })?;
    let command = switcher.speed_switch(RESET_LINE).ok_or_else(|| {
        CtlError::Protocol(format!("{} driver won't support {}", driver.type_name(), RESET_LINE))
    })?;

    info!("Resetting {} as {}", session.device().path, driver.type_name());
    for &rate in rates {
        debug!("Reset command at {}", rate);
        session.set_line(LineSettings::n81(rate))?;
        session.write(&command).await?;
        session.drain().await?;
    }

    session.set_line(RESET_LINE)?;
    if let Some(mode) = driver.mode_switcher() {
        for _ in 0..NMEA_REQUESTS {
            let bytes = mode.mode_switch(WireMode::Nmea, RESET_LINE);
            session.write(&bytes).await?;
        }
    }
    Ok(())
}
