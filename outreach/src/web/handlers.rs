//! Tracking endpoint handlers.
//!
//! The pixel and redirect handlers record first and then answer the client
//! no matter how recording went.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::tracking::{EventKind, EventStore, TrackingEvent, TRANSPARENT_PNG};
use crate::web::dashboard::{render_dashboard, HOME_HTML};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<EventStore>,
    pub default_redirect: Arc<str>,
}

impl AppState {
    pub fn new(store: EventStore, default_redirect: impl Into<String>) -> Self {
        Self {
            store: Arc::new(store),
            default_redirect: Arc::from(default_redirect.into()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            EventStore::new(config.tracking_file.clone()),
            config.default_redirect_url.clone(),
        )
    }
}

/// Query parameters of the tracked URLs. Any of them may be missing.
#[derive(Debug, Default, Deserialize)]
pub struct TrackingParams {
    pub id: Option<String>,
    pub email: Option<String>,
    pub url: Option<String>,
}

impl TrackingParams {
    fn from_query(query: Option<Query<TrackingParams>>) -> Self {
        query.map(|Query(params)| params).unwrap_or_default()
    }

    fn id(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }

    fn email(&self) -> &str {
        self.email.as_deref().unwrap_or("")
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Static welcome page.
pub async fn home() -> Html<&'static str> {
    Html(HOME_HTML)
}

// =============================================================================
// Tracking Ingress
// =============================================================================

/// Open tracking: record an OPEN event and serve the transparent pixel.
pub async fn pixel(
    State(state): State<AppState>,
    query: Option<Query<TrackingParams>>,
) -> impl IntoResponse {
    let params = TrackingParams::from_query(query);

    state
        .store
        .record(params.email(), params.id(), EventKind::Open)
        .await;

    (
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
        ],
        TRANSPARENT_PNG,
    )
}

/// Click tracking: record a CLICK event and redirect to the target.
pub async fn redirect(
    State(state): State<AppState>,
    query: Option<Query<TrackingParams>>,
) -> Response {
    let params = TrackingParams::from_query(query);

    state
        .store
        .record(params.email(), params.id(), EventKind::Click)
        .await;

    let target = params
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(&*state.default_redirect);

    let location = HeaderValue::from_str(target)
        .or_else(|_| {
            warn!(url = %target, "redirect_target_invalid");
            HeaderValue::from_str(&state.default_redirect)
        })
        .unwrap_or_else(|_| HeaderValue::from_static("/"));

    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

// =============================================================================
// Dashboard
// =============================================================================

async fn load_events(state: &AppState) -> Vec<TrackingEvent> {
    match state.store.list_events().await {
        Ok(events) => events,
        Err(e) => {
            warn!(path = %state.store.path().display(), error = %e, "tracking_store_unreadable");
            Vec::new()
        }
    }
}

/// HTML listing of every well-formed event.
pub async fn dashboard_page(State(state): State<AppState>) -> Html<String> {
    let events = load_events(&state).await;
    Html(render_dashboard(&events))
}

/// JSON listing of every well-formed event.
pub async fn events_json(State(state): State<AppState>) -> Json<Vec<TrackingEvent>> {
    Json(load_events(&state).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use axum::Router;
    use tower::ServiceExt;

    use crate::web::router;

    const DEFAULT_TARGET: &str = "https://www.google.com";

    fn app_in(dir: &tempfile::TempDir) -> (Router, AppState) {
        let state = AppState::new(EventStore::new(dir.path().join("tracking.csv")), DEFAULT_TARGET);
        (router(state.clone()), state)
    }

    async fn get(app: &Router, uri: &str) -> Response {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    #[tokio::test]
    async fn test_pixel_records_open_each_time() {
        let dir = tempfile::tempdir().unwrap();
        let (app, state) = app_in(&dir);

        for _ in 0..3 {
            let response = get(&app, "/pixel?id=tok-1&email=a%40x.com").await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
            assert_eq!(body_bytes(response).await, TRANSPARENT_PNG);
        }

        let events = state.store.list_events().await.unwrap();
        assert_eq!(events.len(), 3);
        assert!(events
            .iter()
            .all(|e| e.kind == EventKind::Open && e.tracking_id == "tok-1" && e.email == "a@x.com"));
    }

    #[tokio::test]
    async fn test_pixel_served_when_store_unwritable() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(
            EventStore::new(dir.path().join("missing-dir").join("tracking.csv")),
            DEFAULT_TARGET,
        );
        let app = router(state);

        let response = get(&app, "/pixel?id=tok-1&email=a@x.com").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, TRANSPARENT_PNG);

        let response = get(&app, "/redirect?id=tok-1&email=a@x.com&url=https://example.com/cv").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "https://example.com/cv");
    }

    #[tokio::test]
    async fn test_redirect_without_url_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let (app, state) = app_in(&dir);

        let response = get(&app, "/redirect?id=abc&email=a@x.com").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], DEFAULT_TARGET);

        let events = state.store.list_events().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Click);
        assert_eq!(events[0].tracking_id, "abc");
        assert_eq!(events[0].email, "a@x.com");
    }

    #[tokio::test]
    async fn test_redirect_to_encoded_target() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _state) = app_in(&dir);

        let response = get(
            &app,
            "/redirect?id=abc&email=a%40x.com&url=https%3A%2F%2Fdrive.example.com%2Ff%3Fid%3D1%26v%3D2",
        )
        .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://drive.example.com/f?id=1&v=2"
        );
    }

    #[tokio::test]
    async fn test_missing_params_still_served_but_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        let (app, state) = app_in(&dir);

        let response = get(&app, "/pixel").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get(&app, "/redirect?id=tok-9").await;
        assert_eq!(response.status(), StatusCode::FOUND);

        assert!(state.store.list_events().await.unwrap().is_empty());
        let raw = std::fs::read_to_string(state.store.path()).unwrap();
        assert_eq!(raw.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_dashboard_lists_events() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _state) = app_in(&dir);

        get(&app, "/pixel?id=tok-1&email=a@x.com").await;
        get(&app, "/redirect?id=tok-1&email=a@x.com").await;

        let response = get(&app, "/dashboard").await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(html.contains("tok-1"));
        assert!(html.contains("OPEN"));
        assert!(html.contains("CLICK"));

        let response = get(&app, "/api/events").await;
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        let events = json.as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["event"], "OPEN");
        assert_eq!(events[1]["event"], "CLICK");
    }

    #[tokio::test]
    async fn test_dashboard_without_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _state) = app_in(&dir);

        let response = get(&app, "/dashboard").await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(html.contains("No tracking events recorded yet."));
    }

    #[tokio::test]
    async fn test_home_links_dashboard() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _state) = app_in(&dir);

        let response = get(&app, "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(html.contains("href='/dashboard'"));

        let response = get(&app, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
