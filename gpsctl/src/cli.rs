//! Command-line surface

use std::path::PathBuf;

use clap::Parser;
use gps_ctl::{Context, Request};

/// Switch a GPS receiver between NMEA and binary mode, change its speed or
/// report cycle, or ship it a raw control string.
#[derive(Parser, Debug)]
#[command(name = "gpsctl", version)]
pub struct Cli {
    /// Switch to the vendor binary mode
    #[arg(short = 'b', long = "binary")]
    pub binary: bool,
    /// Switch to NMEA mode
    #[arg(short = 'n', long = "nmea")]
    pub nmea: bool,
    /// Hard reset to NMEA at 4800N1 (needs -t and no daemon)
    #[arg(short = 'r', long = "reset")]
    pub reset: bool,
    /// Change the report cycle, in seconds
    #[arg(short = 'c', long = "cycle", value_name = "SECONDS")]
    pub cycle: Option<String>,
    /// Ship a control string; backslash escapes are allowed
    #[arg(short = 'x', long = "control", value_name = "STRING")]
    pub control: Option<String>,
    /// Print the framed control bytes instead of sending them
    #[arg(short = 'e', long = "echo")]
    pub echo: bool,
    /// Go straight to the device, even if the daemon is running
    #[arg(short = 'f', long = "force")]
    pub force: bool,
    /// List the known device types and their capabilities
    #[arg(short = 'l', long = "list")]
    pub list: bool,
    /// Change the speed, as RATE or RATE:8PS (e.g. 9600:8N1)
    #[arg(short = 's', long = "speed", value_name = "SPEED")]
    pub speed: Option<String>,
    /// Force the device type (exact name or unique substring)
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub device_type: Option<String>,
    /// Timeout in seconds
    #[arg(short = 'T', long = "timeout", value_name = "SECONDS")]
    pub timeout: Option<u64>,
    /// Debug level
    #[arg(short = 'D', long = "debug", value_name = "LEVEL")]
    pub debug: Option<u8>,
    /// Settings file (JSON)
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Device to act on
    #[arg(value_name = "DEVICE")]
    pub device: Option<String>,
}

impl Cli {
    pub fn request(&self) -> Request {
        Request {
            device: self.device.clone(),
            forced_type: self.device_type.clone(),
            to_binary: self.binary,
            to_nmea: self.nmea,
            reset: self.reset,
            speed: self.speed.clone(),
            rate: self.cycle.clone(),
            control: self.control.clone(),
            echo: self.echo,
            force_direct: self.force,
        }
    }

    /// Flags take precedence over the settings file
    pub fn apply(&self, context: &mut Context) {
        if let Some(timeout) = self.timeout {
            context.timeout = timeout;
        }
        if let Some(debug) = self.debug {
            context.debug = debug;
        }
    }
}
