//! Device status protocol.
//!
//! Devices answer `GET http://<address>/rpc/Switch.GetStatus?id=0` with a JSON
//! object. The fields read here are `apower`, `aenergy.total`, `voltage` and
//! `current`; any of them may be missing, in which case it reads as zero.
//!
//! Transport goes through the [`DeviceClient`] trait: [`HttpClient`] talks to
//! real devices, [`MockClient`] scripts responses for tests.

mod http;
pub mod mock;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::metrics::MetricSample;

pub use http::HttpClient;
pub use mock::{MockClient, MockResponse};

/// Path and query of the status RPC.
pub const STATUS_PATH: &str = "/rpc/Switch.GetStatus?id=0";

/// Default divisor turning the device's `aenergy.total` into watt-hours.
pub const DEFAULT_ENERGY_DIVISOR: f64 = 60.0;

/// Error type for a single status fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Request did not complete within the client timeout.
    Timeout,
    /// Could not connect to the device.
    Connect(String),
    /// Device answered with a non-2xx status.
    Status(u16),
    /// Body was not valid JSON.
    Decode(String),
    /// Any other transport failure.
    Request(String),
    /// The poll attempt itself failed (e.g. panicked).
    Internal(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Timeout => write!(f, "request timed out"),
            FetchError::Connect(msg) => write!(f, "connection failed: {}", msg),
            FetchError::Status(code) => write!(f, "HTTP status {}", code),
            FetchError::Decode(msg) => write!(f, "invalid JSON body: {}", msg),
            FetchError::Request(msg) => write!(f, "request failed: {}", msg),
            FetchError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

/// Raw values reported by a device, before normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeviceStatus {
    pub apower: f64,
    pub aenergy_total: f64,
    pub voltage: f64,
    pub current: f64,
}

impl DeviceStatus {
    /// Extracts the known fields. Missing or non-numeric fields read as zero,
    /// and a body that is not an object reads as all zeros.
    pub fn from_json(body: &Value) -> Self {
        let number = |v: Option<&Value>| v.and_then(Value::as_f64).unwrap_or(0.0);
        Self {
            apower: number(body.get("apower")),
            aenergy_total: number(body.get("aenergy").and_then(|e| e.get("total"))),
            voltage: number(body.get("voltage")),
            current: number(body.get("current")),
        }
    }

    /// Converts to a sample, dividing the energy accumulator by `energy_divisor`.
    pub fn to_sample(self, energy_divisor: f64, observed_at: DateTime<Utc>) -> MetricSample {
        MetricSample {
            power_watts: self.apower,
            energy_watthours: self.aenergy_total / energy_divisor,
            voltage_volts: self.voltage,
            current_amps: self.current,
            observed_at,
        }
    }
}

/// Fetches the current status of a device.
pub trait DeviceClient: Send + Sync + 'static {
    fn get_status(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<DeviceStatus, FetchError>> + Send;
}

/// Status URL for a `host` or `host:port` address.
pub fn status_url(address: &str) -> String {
    format!("http://{}{}", address, STATUS_PATH)
}
