//! Access logging middleware (tower Layer + Service).
//!
//! Logs one line per request with the matched route, so scrapes of unknown
//! paths are told apart from real ones. Successful scrapes go to debug, server
//! errors to warn, everything else to info.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::extract::{ConnectInfo, MatchedPath, Request};
use axum::http::{Method, StatusCode};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub(crate) struct AccessLogLayer;

impl<S> tower::Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;
    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService { inner }
    }
}

#[derive(Clone)]
pub(crate) struct AccessLogService<S> {
    inner: S,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Debug,
    Info,
    Warn,
}

fn tier(route: Option<&str>, status: StatusCode) -> Tier {
    if status.is_server_error() {
        Tier::Warn
    } else if status.is_success() && matches!(route, Some("/metrics" | "/")) {
        Tier::Debug
    } else {
        Tier::Info
    }
}

struct RequestLine {
    method: Method,
    path: String,
    route: Option<String>,
    client: String,
}

impl RequestLine {
    fn from_request(req: &Request) -> Self {
        Self {
            method: req.method().clone(),
            path: req.uri().path().to_owned(),
            route: req
                .extensions()
                .get::<MatchedPath>()
                .map(|m| m.as_str().to_owned()),
            client: req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
                .unwrap_or_else(|| "-".to_owned()),
        }
    }

    fn log(&self, status: StatusCode, latency_ms: u64) {
        let Self {
            method,
            path,
            route,
            client,
        } = self;
        let level = tier(route.as_deref(), status);
        let route = route.as_deref().unwrap_or("-");
        let status_code = status.as_u16();
        match level {
            Tier::Debug => {
                debug!(
                    client = %client,
                    route,
                    status = status_code,
                    latency_ms,
                    "{method} {path}"
                )
            }
            Tier::Info => {
                info!(
                    client = %client,
                    route,
                    status = status_code,
                    latency_ms,
                    "{method} {path}"
                )
            }
            Tier::Warn => {
                warn!(
                    client = %client,
                    route,
                    status = status_code,
                    latency_ms,
                    "{method} {path}"
                )
            }
        }
    }
}

impl<S> tower::Service<Request> for AccessLogService<S>
where
    S: tower::Service<Request, Response = axum::response::Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = axum::response::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let line = RequestLine::from_request(&req);
        let t0 = Instant::now();

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let response = inner.call(req).await?;
            line.log(response.status(), t0.elapsed().as_millis() as u64);
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::routing::get;
    use tower::ServiceExt;

    #[test]
    fn successful_scrapes_are_quiet() {
        assert_eq!(tier(Some("/metrics"), StatusCode::OK), Tier::Debug);
        assert_eq!(tier(Some("/"), StatusCode::OK), Tier::Debug);
        assert_eq!(tier(Some("/health"), StatusCode::OK), Tier::Info);
        assert_eq!(tier(None, StatusCode::NOT_FOUND), Tier::Info);
    }

    #[test]
    fn failed_scrapes_are_loud() {
        assert_eq!(
            tier(Some("/metrics"), StatusCode::INTERNAL_SERVER_ERROR),
            Tier::Warn
        );
    }

    #[test]
    fn request_line_reads_path_and_client() {
        let mut req = Request::builder()
            .uri("/api/v1/devices?x=1")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo("10.1.2.3:5555".parse::<SocketAddr>().unwrap()));

        let line = RequestLine::from_request(&req);
        assert_eq!(line.path, "/api/v1/devices");
        assert_eq!(line.client, "10.1.2.3");
        assert_eq!(line.route, None);
    }

    #[tokio::test]
    async fn passes_responses_through() {
        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .layer(AccessLogLayer);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
