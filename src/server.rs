//! HTTP front end routing every request through a registration's fetch handler.
//!
//! Incoming requests are keyed by their path and query, so only assets
//! configured with a leading slash (such as `/`) can be served from the
//! cache here; `index.html` and `/index.html` are different keys.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Response as HttpResponse, StatusCode};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::agent::{FetchOutcome, LifecycleHandler};
use crate::error::{Error, Result};
use crate::lifecycle::{LifecycleState, Registration};
use crate::request::Request;

/// Header naming where a proxied response came from (`cache` or `network`).
pub const SOURCE_HEADER: &str = "x-precache-source";

/// Response headers recomputed by the server rather than forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-length",
    "upgrade",
];

/// Request headers that describe the client's connection to this server and
/// must not reach the origin.
const REQUEST_SKIP: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "content-length",
];

fn forwardable_request_header(name: &str) -> bool {
    !name.starts_with("proxy-") && !REQUEST_SKIP.contains(&name)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state: LifecycleState,
}

async fn api_health<H: LifecycleHandler + 'static>(
    State(registration): State<Arc<Registration<H>>>,
) -> impl IntoResponse {
    axum::Json(HealthResponse {
        status: "ok",
        state: registration.state(),
    })
}

async fn proxy<H: LifecycleHandler + 'static>(
    State(registration): State<Arc<Registration<H>>>,
    request: axum::extract::Request,
) -> AxumResponse {
    let request = to_agent_request(&request);
    match registration.fetch(request).await {
        Ok(outcome) => to_http_response(outcome),
        Err(e @ Error::InvalidState { .. }) => {
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
        Err(e) => {
            log::warn!("Fetch failed: {e}");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

/// Builds the agent's view of an incoming request: method, path plus query,
/// and end-to-end headers. The body is not forwarded.
fn to_agent_request(request: &axum::extract::Request) -> Request {
    let url = request
        .uri()
        .path_and_query()
        .map_or("/", |pq| pq.as_str());
    request
        .headers()
        .iter()
        .filter(|(name, _)| forwardable_request_header(name.as_str()))
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .fold(Request::new(request.method().as_str(), url), |req, (n, v)| {
            req.with_header(n, v)
        })
}

fn to_http_response(outcome: FetchOutcome) -> AxumResponse {
    let FetchOutcome { response, source } = outcome;
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut builder = HttpResponse::builder().status(status);
    for (name, value) in &response.headers {
        if HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder = builder.header(SOURCE_HEADER, source.to_string());

    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|e| (StatusCode::BAD_GATEWAY, e.to_string()).into_response())
}

/// Builds the router: `/api/health` plus a fallback that proxies everything
/// else through the agent.
pub fn router<H: LifecycleHandler + 'static>(registration: Arc<Registration<H>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(api_health::<H>))
        .fallback(proxy::<H>)
        .layer(cors)
        .with_state(registration)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        log::info!("Received SIGINT");
    }
}

/// Serves the registration on `host:port` until interrupted.
///
/// # Errors
///
/// Returns an error if the address is invalid, the bind fails, or the
/// server stops with an error.
pub async fn serve<H: LifecycleHandler + 'static>(
    registration: Arc<Registration<H>>,
    host: &str,
    port: u16,
) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| Error::Server(format!("invalid bind address {host}:{port}: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Serving on http://{}", listener.local_addr()?);

    axum::serve(listener, router(registration))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Server(e.to_string()))
}
