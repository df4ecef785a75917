//! Device registry: the immutable set of devices to poll, parsed once at startup.
//!
//! Configuration is a comma-separated list of `name:address` entries, e.g.
//! `kitchen:192.168.18.126, office:192.168.18.127:8080`. The entry is split at
//! the first `:` so addresses may carry a port.

use std::collections::BTreeMap;

use tracing::warn;

/// A named device and the address its status endpoint is reachable at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: String,
    pub address: String,
}

/// Reason a configuration entry was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    /// Entry has no `:` separator.
    MissingSeparator,
    /// Name part is empty after trimming.
    EmptyName,
    /// Address part is empty after trimming.
    EmptyAddress,
    /// Name cannot be used as a metric name prefix.
    InvalidName(String),
}

impl std::fmt::Display for EntryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryError::MissingSeparator => write!(f, "missing ':' separator"),
            EntryError::EmptyName => write!(f, "empty device name"),
            EntryError::EmptyAddress => write!(f, "empty device address"),
            EntryError::InvalidName(name) => {
                write!(f, "device name '{}' is not a valid metric name prefix", name)
            }
        }
    }
}

impl std::error::Error for EntryError {}

/// A configuration entry that did not make it into the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub entry: String,
    pub reason: EntryError,
}

/// Parses a single `name:address` entry.
pub fn parse_entry(entry: &str) -> Result<DeviceDescriptor, EntryError> {
    let (name, address) = entry.split_once(':').ok_or(EntryError::MissingSeparator)?;
    let name = name.trim();
    let address = address.trim();

    if name.is_empty() {
        return Err(EntryError::EmptyName);
    }
    if address.is_empty() {
        return Err(EntryError::EmptyAddress);
    }
    if !is_valid_metric_prefix(name) {
        return Err(EntryError::InvalidName(name.to_string()));
    }

    Ok(DeviceDescriptor {
        name: name.to_string(),
        address: address.to_string(),
    })
}

/// Prometheus metric names match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
fn is_valid_metric_prefix(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Immutable device name → address mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, String>,
}

impl DeviceRegistry {
    /// Parses the registry, logging every skipped entry.
    ///
    /// Malformed entries never abort parsing. An empty or blank string yields an
    /// empty registry.
    pub fn parse(config: &str) -> Self {
        let (registry, skipped) = Self::parse_with_report(config);
        for s in &skipped {
            warn!(entry = %s.entry, reason = %s.reason, "skipping device entry");
        }
        registry
    }

    /// Parses the registry and returns the entries that were skipped.
    ///
    /// Blank entries (e.g. from a trailing comma) are ignored without a report.
    /// Later entries overwrite earlier ones with the same name.
    pub fn parse_with_report(config: &str) -> (Self, Vec<SkippedEntry>) {
        let mut devices = BTreeMap::new();
        let mut skipped = Vec::new();

        for entry in config.split(',') {
            if entry.trim().is_empty() {
                continue;
            }
            match parse_entry(entry) {
                Ok(device) => {
                    devices.insert(device.name, device.address);
                }
                Err(reason) => skipped.push(SkippedEntry {
                    entry: entry.trim().to_string(),
                    reason,
                }),
            }
        }

        (Self { devices }, skipped)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Address configured for `name`.
    pub fn address(&self, name: &str) -> Option<&str> {
        self.devices.get(name).map(String::as_str)
    }

    /// Devices in name order.
    pub fn iter(&self) -> impl Iterator<Item = DeviceDescriptor> + '_ {
        self.devices.iter().map(|(name, address)| DeviceDescriptor {
            name: name.clone(),
            address: address.clone(),
        })
    }
}
