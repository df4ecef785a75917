//! Background pollers: one task per registered device.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use plugwatch_core::device::DeviceClient;
use plugwatch_core::poller::{Poller, PollerConfig};
use plugwatch_core::registry::DeviceRegistry;

use crate::state::SharedMetrics;

/// Spawns a poller per device. Tasks are independent: one stuck or panicking
/// device never delays another, nor the HTTP server.
pub(crate) fn spawn_pollers<C: DeviceClient>(
    registry: &DeviceRegistry,
    client: Arc<C>,
    metrics: SharedMetrics,
    config: PollerConfig,
) -> Vec<JoinHandle<()>> {
    registry
        .iter()
        .map(|device| {
            info!(device = %device.name, address = %device.address, "launching poller");
            let poller = Poller::new(device, Arc::clone(&client), Arc::clone(&metrics), config);
            tokio::spawn(poller.run())
        })
        .collect()
}
