//! Shared per-device gauge set.
//!
//! Built once from the [`DeviceRegistry`]: each device gets four gauges
//! (`<device>_power_watts`, `<device>_energy_wh`, `<device>_voltage_v`,
//! `<device>_current_a`) registered in a private Prometheus registry. Gauges
//! store their value in an atomic f64, so a scrape never sees a torn field.
//! Each device is written by exactly one poller; readers take no locks.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use prometheus::proto::MetricFamily;
use prometheus::{Gauge, Registry};
use serde::Serialize;
use tracing::warn;

use crate::registry::DeviceRegistry;

/// One of the four gauges kept per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Power,
    Energy,
    Voltage,
    Current,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Power, Field::Energy, Field::Voltage, Field::Current];

    /// Metric name suffix appended to the device name.
    pub fn suffix(self) -> &'static str {
        match self {
            Field::Power => "power_watts",
            Field::Energy => "energy_wh",
            Field::Voltage => "voltage_v",
            Field::Current => "current_a",
        }
    }

    fn help(self) -> &'static str {
        match self {
            Field::Power => "Instantaneous power in watts",
            Field::Energy => "Cumulative energy in watt-hours",
            Field::Voltage => "Voltage in volts",
            Field::Current => "Current in amperes",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Latest reading taken from a device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSample {
    pub power_watts: f64,
    pub energy_watthours: f64,
    pub voltage_volts: f64,
    pub current_amps: f64,
    pub observed_at: DateTime<Utc>,
}

impl MetricSample {
    pub fn value(&self, field: Field) -> f64 {
        match field {
            Field::Power => self.power_watts,
            Field::Energy => self.energy_watthours,
            Field::Voltage => self.voltage_volts,
            Field::Current => self.current_amps,
        }
    }
}

/// Point-in-time copy of one device's entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReading {
    pub address: String,
    pub power_watts: f64,
    pub energy_wh: f64,
    pub voltage_v: f64,
    pub current_a: f64,
    /// `None` until the first successful poll.
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u64,
}

struct DeviceEntry {
    address: String,
    gauges: [Gauge; 4],
    /// Epoch milliseconds of the last successful poll, 0 = never.
    last_success_ms: AtomicI64,
    consecutive_failures: AtomicU64,
}

/// Device name → gauges. The key set is fixed at construction.
pub struct MetricSet {
    registry: Registry,
    devices: BTreeMap<String, DeviceEntry>,
}

impl MetricSet {
    /// Creates zero-valued gauges for every registered device.
    pub fn new(devices: &DeviceRegistry) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let mut entries = BTreeMap::new();

        for device in devices.iter() {
            let gauge = |field: Field| -> Result<Gauge, prometheus::Error> {
                let gauge = Gauge::new(
                    format!("{}_{}", device.name, field.suffix()),
                    format!("{} ({})", field.help(), device.name),
                )?;
                registry.register(Box::new(gauge.clone()))?;
                Ok(gauge)
            };
            // Indexed by `Field::index`.
            let gauges = [
                gauge(Field::Power)?,
                gauge(Field::Energy)?,
                gauge(Field::Voltage)?,
                gauge(Field::Current)?,
            ];
            entries.insert(
                device.name,
                DeviceEntry {
                    address: device.address,
                    gauges,
                    last_success_ms: AtomicI64::new(0),
                    consecutive_failures: AtomicU64::new(0),
                },
            );
        }

        Ok(Self {
            registry,
            devices: entries,
        })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn entry(&self, device: &str) -> Option<&DeviceEntry> {
        let entry = self.devices.get(device);
        debug_assert!(entry.is_some(), "unknown device '{}'", device);
        if entry.is_none() {
            warn!(device, "write to unregistered device ignored");
        }
        entry
    }

    /// Sets a single gauge.
    pub fn set(&self, device: &str, field: Field, value: f64) {
        if let Some(entry) = self.entry(device) {
            entry.gauges[field.index()].set(value);
        }
    }

    /// Publishes a successful sample: all four gauges, the success timestamp,
    /// and a reset of the failure streak.
    pub fn record(&self, device: &str, sample: &MetricSample) {
        let Some(entry) = self.entry(device) else {
            return;
        };
        for field in Field::ALL {
            entry.gauges[field.index()].set(sample.value(field));
        }
        entry
            .last_success_ms
            .store(sample.observed_at.timestamp_millis(), Ordering::Relaxed);
        entry.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Counts a failed poll. Gauge values are left untouched.
    /// Returns the length of the current failure streak.
    pub fn note_failure(&self, device: &str) -> u64 {
        match self.entry(device) {
            Some(entry) => entry.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1,
            None => 0,
        }
    }

    pub fn get(&self, device: &str, field: Field) -> Option<f64> {
        self.devices
            .get(device)
            .map(|entry| entry.gauges[field.index()].get())
    }

    /// Copies every device's current values.
    pub fn snapshot(&self) -> BTreeMap<String, DeviceReading> {
        self.devices
            .iter()
            .map(|(name, entry)| {
                let ms = entry.last_success_ms.load(Ordering::Relaxed);
                let reading = DeviceReading {
                    address: entry.address.clone(),
                    power_watts: entry.gauges[Field::Power.index()].get(),
                    energy_wh: entry.gauges[Field::Energy.index()].get(),
                    voltage_v: entry.gauges[Field::Voltage.index()].get(),
                    current_a: entry.gauges[Field::Current.index()].get(),
                    last_success: if ms == 0 {
                        None
                    } else {
                        DateTime::from_timestamp_millis(ms)
                    },
                    consecutive_failures: entry.consecutive_failures.load(Ordering::Relaxed),
                };
                (name.clone(), reading)
            })
            .collect()
    }

    /// Metric families for text exposition.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}
