//! Prometheus text exposition of the current metric set.
//!
//! Rendering only reads the atomic gauges; it never waits on a poller and
//! never triggers a device fetch.

use prometheus::{Encoder, TextEncoder};

use crate::metrics::MetricSet;

/// `Content-Type` of a rendered scrape body.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Renders every device's gauges. An empty set renders as an empty body.
pub fn render(metrics: &MetricSet) -> Result<String, prometheus::Error> {
    let families = metrics.gather();
    let encoder = TextEncoder::new();
    let mut buf = Vec::with_capacity(families.len() * 128);
    encoder.encode(&families, &mut buf)?;
    String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
