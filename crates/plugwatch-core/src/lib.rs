//! plugwatch-core: device polling and metric exposition for smart-plug telemetry.
//!
//! Provides:
//! - `registry`: device name → address mapping parsed from configuration
//! - `metrics`: shared per-device gauge set backed by a Prometheus registry
//! - `device`: device status protocol, HTTP client and an in-memory mock
//! - `poller`: per-device polling loop with failure isolation
//! - `exposition`: Prometheus text rendering of the current metric set
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐      ┌──────────────┐
//! │  DeviceRegistry  │─────►│   MetricSet  │◄──────── exposition::render
//! └────────┬─────────┘      └──────▲───────┘
//!          │ one per device        │ record / note_failure
//!   ┌──────▼──────┐  ┌─────────────┴┐
//!   │   Poller    │  │    Poller    │  ...
//!   └──────┬──────┘  └──────┬───────┘
//!          └────────┬───────┘
//!            ┌──────▼───────┐
//!            │ DeviceClient │ (trait)
//!            └──────┬───────┘
//!          ┌────────┴────────┐
//!   ┌──────▼──────┐   ┌──────▼──────┐
//!   │ HttpClient  │   │ MockClient  │
//!   └─────────────┘   └─────────────┘
//! ```

pub mod device;
pub mod exposition;
pub mod metrics;
pub mod poller;
pub mod registry;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
