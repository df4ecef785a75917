//! In-memory device client for testing pollers without a network.
//!
//! Each address has a sticky default response plus an optional queue of
//! one-shot responses consumed first.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{DeviceClient, DeviceStatus, FetchError};

/// What a mock device does when polled.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Status(DeviceStatus),
    Fail(FetchError),
    /// Panics inside the fetch.
    Panic,
}

#[derive(Default)]
struct MockDevice {
    default: Option<MockResponse>,
    queued: VecDeque<MockResponse>,
    calls: usize,
}

/// Scripted [`DeviceClient`].
///
/// Addresses without any configured response fail with `FetchError::Connect`.
#[derive(Default)]
pub struct MockClient {
    devices: Mutex<HashMap<String, MockDevice>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the response returned whenever the queue for `address` is empty.
    pub fn set(&self, address: &str, response: MockResponse) {
        self.devices
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .default = Some(response);
    }

    /// Queues a response returned once, before falling back to the default.
    pub fn push(&self, address: &str, response: MockResponse) {
        self.devices
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .queued
            .push_back(response);
    }

    /// Number of fetches issued against `address`.
    pub fn calls(&self, address: &str) -> usize {
        self.devices
            .lock()
            .unwrap()
            .get(address)
            .map_or(0, |d| d.calls)
    }

    fn next_response(&self, address: &str) -> Option<MockResponse> {
        let mut devices = self.devices.lock().unwrap();
        let device = devices.entry(address.to_string()).or_default();
        device.calls += 1;
        device.queued.pop_front().or_else(|| device.default.clone())
    }
}

impl DeviceClient for MockClient {
    async fn get_status(&self, address: &str) -> Result<DeviceStatus, FetchError> {
        match self.next_response(address) {
            Some(MockResponse::Status(status)) => Ok(status),
            Some(MockResponse::Fail(err)) => Err(err),
            Some(MockResponse::Panic) => panic!("mock device {} panicked", address),
            None => Err(FetchError::Connect(format!("no mock device at {}", address))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_responses_precede_default() {
        let client = MockClient::new();
        client.set("a", MockResponse::Fail(FetchError::Timeout));
        client.push(
            "a",
            MockResponse::Status(DeviceStatus {
                apower: 1.0,
                ..DeviceStatus::default()
            }),
        );

        assert_eq!(client.get_status("a").await.unwrap().apower, 1.0);
        assert_eq!(client.get_status("a").await, Err(FetchError::Timeout));
        assert_eq!(client.get_status("a").await, Err(FetchError::Timeout));
        assert_eq!(client.calls("a"), 3);
    }

    #[tokio::test]
    async fn unknown_address_fails_to_connect() {
        let client = MockClient::new();
        assert!(matches!(
            client.get_status("nowhere").await,
            Err(FetchError::Connect(_))
        ));
        assert_eq!(client.calls("nowhere"), 1);
        assert_eq!(client.calls("never-polled"), 0);
    }
}
