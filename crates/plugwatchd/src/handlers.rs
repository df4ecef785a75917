//! HTTP request handlers: scrape endpoint, health, device status API.

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde::Serialize;
use tracing::error;

use plugwatch_core::exposition;
use plugwatch_core::metrics::DeviceReading;

use crate::state::{AppState, SharedMetrics};

pub(crate) fn router(metrics: SharedMetrics) -> Router {
    Router::new()
        .route("/", get(handle_metrics))
        .route("/metrics", get(handle_metrics))
        .route("/health", get(handle_health))
        .route("/api/v1/devices", get(handle_devices))
        .with_state(metrics)
}

// ============================================================
// Scrape
// ============================================================

/// Renders the last known values. Never waits on a poller.
pub(crate) async fn handle_metrics(State(metrics): AppState) -> Response {
    match exposition::render(&metrics) {
        Ok(body) => ([(header::CONTENT_TYPE, exposition::CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
    }
}

// ============================================================
// Health
// ============================================================

pub(crate) async fn handle_health() -> &'static str {
    "ok"
}

// ============================================================
// Devices
// ============================================================

#[derive(Serialize)]
pub(crate) struct DeviceView {
    name: String,
    #[serde(flatten)]
    reading: DeviceReading,
}

pub(crate) async fn handle_devices(State(metrics): AppState) -> Json<Vec<DeviceView>> {
    let devices = metrics
        .snapshot()
        .into_iter()
        .map(|(name, reading)| DeviceView { name, reading })
        .collect();
    Json(devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::extract::Request;
    use tower::ServiceExt;

    use plugwatch_core::metrics::{Field, MetricSet};
    use plugwatch_core::registry::DeviceRegistry;

    fn metrics(config: &str) -> SharedMetrics {
        Arc::new(MetricSet::new(&DeviceRegistry::parse(config)).unwrap())
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_text_exposition() {
        let m = metrics("kitchen:10.0.0.1");
        m.set("kitchen", Field::Power, 12.5);

        for uri in ["/metrics", "/"] {
            let (status, content_type, body) = get_body(router(Arc::clone(&m)), uri).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(content_type.as_deref(), Some(exposition::CONTENT_TYPE));
            assert!(body.contains("# TYPE kitchen_power_watts gauge"));
            assert!(body.contains("kitchen_power_watts 12.5"));
        }
    }

    #[tokio::test]
    async fn empty_config_serves_empty_body() {
        let (status, _, body) = get_body(router(metrics("")), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, _, body) = get_body(router(metrics("")), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn devices_endpoint_reports_staleness() {
        let m = metrics("kitchen:10.0.0.1,office:10.0.0.2");
        m.note_failure("office");

        let (status, _, body) = get_body(router(m), "/api/v1/devices").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        let devices = json.as_array().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1]["name"], "office");
        assert_eq!(devices[1]["address"], "10.0.0.2");
        assert_eq!(devices[1]["consecutive_failures"], 1);
        assert!(devices[1]["last_success"].is_null());
        assert_eq!(devices[0]["power_watts"], 0.0);
    }
}
