//! Tracking web server.
//!
//! This module provides the HTTP surface recipients' mail clients hit:
//! - `/pixel` records an open and serves a transparent image
//! - `/redirect` records a click and redirects to the destination
//! - `/dashboard` and `/api/events` list recorded events
//!
//! Recording is best effort. The image and the redirect are always served.

pub mod dashboard;
pub mod handlers;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub use handlers::{
    dashboard_page, events_json, health, home, pixel, redirect, AppState, HealthResponse,
    TrackingParams,
};

/// Build the tracking router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/pixel", get(pixel))
        .route("/redirect", get(redirect))
        .route("/dashboard", get(dashboard_page))
        .route("/api/events", get(events_json))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
