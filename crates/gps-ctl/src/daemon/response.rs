//! Daemon responses and their classification

use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// One device as the daemon describes it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceReport {
    pub path: String,
    /// Driver type name; empty until the daemon has identified the device
    pub driver: String,
    pub subtype: String,
    pub bps: u32,
    pub parity: String,
    pub stopbits: u8,
    /// 1 when the device is in its native binary mode
    pub native: u8,
    pub cycle: f64,
}

/// A decoded response line
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "class")]
pub enum Response {
    #[serde(rename = "VERSION")]
    Version {
        #[serde(default)]
        release: String,
    },
    #[serde(rename = "DEVICES")]
    Devices {
        #[serde(default)]
        devices: Vec<DeviceReport>,
    },
    #[serde(rename = "DEVICE")]
    Device(DeviceReport),
    #[serde(rename = "WATCH")]
    Watch {},
    #[serde(rename = "ERROR")]
    Error {
        #[serde(default)]
        message: String,
    },
    /// Any class the control path does not consume
    #[serde(other)]
    Other,
}

impl Response {
    /// Decode one line; anything unparseable classifies as [`Response::Other`]
    pub fn parse(line: &str) -> Response {
        serde_json::from_str(line.trim()).unwrap_or(Response::Other)
    }

    pub fn mask(&self) -> ResponseMask {
        match self {
            Response::Version { .. } => ResponseMask::VERSION,
            Response::Devices { .. } => ResponseMask::DEVICELIST,
            Response::Device(_) => ResponseMask::DEVICE,
            Response::Watch {} => ResponseMask::WATCH,
            Response::Error { .. } => ResponseMask::ERROR,
            Response::Other => ResponseMask::OTHER,
        }
    }
}

/// Set of response classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResponseMask(u32);

impl ResponseMask {
    pub const ERROR: ResponseMask = ResponseMask(1 << 0);
    pub const DEVICE: ResponseMask = ResponseMask(1 << 1);
    pub const DEVICELIST: ResponseMask = ResponseMask(1 << 2);
    pub const VERSION: ResponseMask = ResponseMask(1 << 3);
    pub const WATCH: ResponseMask = ResponseMask(1 << 4);
    pub const OTHER: ResponseMask = ResponseMask(1 << 5);

    pub fn intersects(&self, other: ResponseMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for ResponseMask {
    type Output = ResponseMask;

    fn bitor(self, rhs: ResponseMask) -> ResponseMask {
        ResponseMask(self.0 | rhs.0)
    }
}

/// What a query waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// The first response that is not an error, whatever its class
    NonError,
    /// A response in one of these classes
    Classes(ResponseMask),
}

impl Expect {
    pub fn accepts(&self, response: &Response) -> bool {
        match self {
            Expect::NonError => !matches!(response, Response::Error { .. }),
            Expect::Classes(mask) => mask.intersects(response.mask()),
        }
    }
}
