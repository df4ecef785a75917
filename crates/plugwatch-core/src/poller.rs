//! Per-device polling loop.
//!
//! Each device gets its own [`Poller`] running on its own task:
//!
//! ```text
//! Polling ──► Fetching ──► Success ──► Updating ──────┐
//!    ▲                 └─► Failure ──► LoggingError ──┤
//!    └───────────────── sleep(interval) ◄─────────────┘
//! ```
//!
//! A failed attempt never touches the device's gauges, so scrapes keep seeing
//! the last good reading. Every attempt runs on a child task; a panic there is
//! reported as a failure and the loop carries on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::device::{DEFAULT_ENERGY_DIVISOR, DeviceClient, FetchError};
use crate::metrics::{MetricSample, MetricSet};
use crate::registry::DeviceDescriptor;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    /// Delay after each attempt, successful or not.
    pub interval: Duration,
    /// Divisor applied to the device's energy accumulator.
    pub energy_divisor: f64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            energy_divisor: DEFAULT_ENERGY_DIVISOR,
        }
    }
}

/// Result of a single poll attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Success(MetricSample),
    Failure(FetchError),
}

pub struct Poller<C> {
    device: DeviceDescriptor,
    client: Arc<C>,
    metrics: Arc<MetricSet>,
    config: PollerConfig,
}

impl<C> Clone for Poller<C> {
    fn clone(&self) -> Self {
        Self {
            device: self.device.clone(),
            client: Arc::clone(&self.client),
            metrics: Arc::clone(&self.metrics),
            config: self.config,
        }
    }
}

impl<C: DeviceClient> Poller<C> {
    pub fn new(
        device: DeviceDescriptor,
        client: Arc<C>,
        metrics: Arc<MetricSet>,
        config: PollerConfig,
    ) -> Self {
        Self {
            device,
            client,
            metrics,
            config,
        }
    }

    /// Fetches once and publishes the result into the metric set.
    pub async fn poll_once(&self) -> PollOutcome {
        match self.client.get_status(&self.device.address).await {
            Ok(status) => {
                let sample = status.to_sample(self.config.energy_divisor, Utc::now());
                self.metrics.record(&self.device.name, &sample);
                PollOutcome::Success(sample)
            }
            Err(e) => {
                self.metrics.note_failure(&self.device.name);
                PollOutcome::Failure(e)
            }
        }
    }

    /// Runs `poll_once` on a child task so a panic stays inside this attempt.
    async fn attempt(&self) -> PollOutcome {
        let this = self.clone();
        match tokio::spawn(async move { this.poll_once().await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.metrics.note_failure(&self.device.name);
                let reason = if e.is_panic() {
                    "poll attempt panicked".to_string()
                } else {
                    format!("poll attempt aborted: {}", e)
                };
                PollOutcome::Failure(FetchError::Internal(reason))
            }
        }
    }

    /// Polls forever. Only returns if the surrounding task is dropped.
    pub async fn run(self) {
        let name = self.device.name.as_str();
        let address = self.device.address.as_str();
        let interval = self.config.interval;
        let mut history = PollHistory::default();

        debug!(device = name, address, "poller started");

        loop {
            let t0 = Instant::now();
            let outcome = self.attempt().await;
            let duration_ms = t0.elapsed().as_millis() as u64;

            match (history.observe(&outcome), outcome) {
                (PollEvent::FirstSample, PollOutcome::Success(sample)) => info!(
                    device = name,
                    power_watts = sample.power_watts,
                    energy_wh = sample.energy_watthours,
                    voltage_v = sample.voltage_volts,
                    current_a = sample.current_amps,
                    duration_ms,
                    "first sample collected"
                ),
                (PollEvent::Recovered { failures }, _) => {
                    info!(device = name, failures, duration_ms, "device recovered")
                }
                (PollEvent::Failed { failures }, PollOutcome::Failure(e)) => warn!(
                    device = name,
                    address,
                    error = %e,
                    failures,
                    duration_ms,
                    "poll failed"
                ),
                (_, PollOutcome::Success(sample)) => debug!(
                    device = name,
                    power_watts = sample.power_watts,
                    energy_wh = sample.energy_watthours,
                    voltage_v = sample.voltage_volts,
                    current_a = sample.current_amps,
                    duration_ms,
                    "sample collected"
                ),
                (_, PollOutcome::Failure(e)) => warn!(device = name, error = %e, "poll failed"),
            }

            tokio::time::sleep(interval).await;
        }
    }
}

/// How an attempt is reported, given what came before it.
/// `FirstSample` and `Recovered` log at info, `Sample` at debug, `Failed` at warn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollEvent {
    FirstSample,
    Recovered { failures: u64 },
    Sample,
    Failed { failures: u64 },
}

#[derive(Debug, Default)]
struct PollHistory {
    successes: u64,
    failures: u64,
}

impl PollHistory {
    fn observe(&mut self, outcome: &PollOutcome) -> PollEvent {
        match outcome {
            PollOutcome::Success(_) => {
                self.successes += 1;
                let failures = std::mem::take(&mut self.failures);
                if self.successes == 1 {
                    PollEvent::FirstSample
                } else if failures > 0 {
                    PollEvent::Recovered { failures }
                } else {
                    PollEvent::Sample
                }
            }
            PollOutcome::Failure(_) => {
                self.failures += 1;
                PollEvent::Failed {
                    failures: self.failures,
                }
            }
        }
    }
}
