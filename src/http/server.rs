//! Frontend HTTP server.
//!
//! # Responsibilities
//! - Create the Axum router with the relay handler as its only route
//! - Wire up middleware (tracing, read/write timeouts)
//! - Extract the target from each request path and forward it
//! - Send malformed targets to the diagnostic backend

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tower_http::{
    timeout::{RequestBodyTimeoutLayer, TimeoutLayer},
    trace::TraceLayer,
};

use crate::config::TimeoutConfig;
use crate::http::forward::{forward, limit_body, UpstreamClient};
use crate::net::InFlightTracker;
use crate::observability::metrics;
use crate::routing::{self, RewriteOutcome};

/// Application state injected into the relay handler.
#[derive(Clone)]
pub struct AppState {
    pub client: UpstreamClient,
    /// Where malformed targets are sent.
    pub diagnostic_addr: SocketAddr,
    pub in_flight: InFlightTracker,
    /// Bound on producing the whole response, body included.
    pub write_timeout: Duration,
}

impl AppState {
    pub fn new(
        client: UpstreamClient,
        diagnostic_addr: SocketAddr,
        in_flight: InFlightTracker,
        timeouts: &TimeoutConfig,
    ) -> Self {
        Self {
            client,
            diagnostic_addr,
            in_flight,
            write_timeout: timeouts.write(),
        }
    }
}

/// Build the frontend router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(timeouts: &TimeoutConfig, state: AppState) -> Router {
    Router::new()
        .fallback(relay_handler)
        .with_state(state)
        .layer(RequestBodyTimeoutLayer::new(timeouts.read()))
        .layer(TimeoutLayer::new(timeouts.write()))
        .layer(TraceLayer::new_for_http())
}

/// Rewrite the request towards the target in its path and forward it.
async fn relay_handler(State(state): State<AppState>, mut request: Request<Body>) -> Response {
    let _in_flight = state.in_flight.track();
    let start_time = Instant::now();
    let write_deadline = tokio::time::Instant::now() + state.write_timeout;

    let peer: Option<IpAddr> = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let method = request.method().clone();

    let outcome = routing::rewrite(routing::original_request_uri(&request));
    let label = match &outcome {
        RewriteOutcome::Resolved(target) => {
            tracing::debug!(method = %method, target = %target, "Relaying request");
            "resolved"
        }
        RewriteOutcome::Failed {
            original_request_uri,
            error_description,
        } => {
            tracing::info!(
                method = %method,
                target = %original_request_uri,
                error = %error_description,
                "Malformed target URL"
            );
            "malformed"
        }
    };

    if let Err(e) = routing::apply(&outcome, &mut request, state.diagnostic_addr) {
        tracing::warn!(method = %method, error = %e, "Target cannot be forwarded");
        metrics::record_request(label, StatusCode::BAD_GATEWAY.as_u16(), start_time);
        return StatusCode::BAD_GATEWAY.into_response();
    }

    match forward(&state.client, request, peer).await {
        Ok(response) => {
            metrics::record_request(label, response.status().as_u16(), start_time);
            limit_body(response, write_deadline, state.write_timeout)
        }
        Err(e) => {
            tracing::error!(method = %method, error = %e, "Upstream request failed");
            metrics::record_request(label, StatusCode::BAD_GATEWAY.as_u16(), start_time);
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}
