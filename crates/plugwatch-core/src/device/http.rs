//! HTTP transport for real devices.

use std::time::Duration;

use serde_json::Value;
use tracing::trace;

use super::{DeviceClient, DeviceStatus, FetchError, status_url};

/// Shared HTTP client. One instance serves every poller; the timeout applies to
/// each request independently.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("plugwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Request(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::Connect(e.to_string())
    } else {
        FetchError::Request(e.to_string())
    }
}

impl DeviceClient for HttpClient {
    async fn get_status(&self, address: &str) -> Result<DeviceStatus, FetchError> {
        let url = status_url(address);
        trace!(%url, "fetching device status");

        let response = self.client.get(&url).send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(classify)?;
        let json: Value =
            serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(DeviceStatus::from_json(&json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::net::SocketAddr;

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn device(handler: axum::routing::MethodRouter) -> Router {
        Router::new().route("/rpc/Switch.GetStatus", handler)
    }

    fn client(timeout_ms: u64) -> HttpClient {
        HttpClient::new(Duration::from_millis(timeout_ms)).unwrap()
    }

    #[tokio::test]
    async fn reads_status_from_device() {
        let addr = serve(device(get(|| async {
            r#"{"id":0,"apower":12.5,"aenergy":{"total":600.0},"voltage":230.1,"current":0.8}"#
        })))
        .await;

        let status = client(2000).get_status(&addr.to_string()).await.unwrap();
        assert_eq!(status.apower, 12.5);
        assert_eq!(status.aenergy_total, 600.0);
        assert_eq!(status.voltage, 230.1);
        assert_eq!(status.current, 0.8);
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let addr = serve(device(get(|| async {
            (StatusCode::SERVICE_UNAVAILABLE, "busy")
        })))
        .await;

        let err = client(2000).get_status(&addr.to_string()).await.unwrap_err();
        assert_eq!(err, FetchError::Status(503));
    }

    #[tokio::test]
    async fn unknown_path_is_a_status_error() {
        let addr = serve(Router::new()).await;
        let err = client(2000).get_status(&addr.to_string()).await.unwrap_err();
        assert_eq!(err, FetchError::Status(404));
    }

    #[tokio::test]
    async fn non_json_body_is_a_decode_error() {
        let addr = serve(device(get(|| async { "<html>login</html>" }))).await;
        let err = client(2000).get_status(&addr.to_string()).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn slow_device_times_out() {
        let addr = serve(device(get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "{}"
        })))
        .await;

        let err = client(100).get_status(&addr.to_string()).await.unwrap_err();
        assert_eq!(err, FetchError::Timeout);
    }

    #[tokio::test]
    async fn closed_port_is_a_connect_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(2000).get_status(&addr.to_string()).await.unwrap_err();
        assert!(matches!(err, FetchError::Connect(_)), "got {:?}", err);
    }
}
