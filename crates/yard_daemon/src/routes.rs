use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{
        sse::{Event, Sse},
        Json,
    },
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use yard_core::{Command, EventEnvelope, ScanPurpose, YardId, YardSettings, YardStatus};

use crate::state::AppState;

#[cfg(test)]
pub fn make_router(state: AppState) -> Router {
    make_router_with_cors(state, "http://localhost:5173").expect("valid origin")
}

pub fn make_router_with_cors(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    let origin = cors_origin
        .parse::<axum::http::HeaderValue>()
        .with_context(|| format!("invalid CORS origin {cors_origin}"))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Ok(Router::new()
        .route("/api/v1/meta", get(meta_handler))
        .route("/api/v1/yards", get(yards_handler))
        .route("/api/v1/stream", get(stream_handler))
        .route("/api/v1/yards/:id/command", post(command_handler))
        .route("/api/v1/yards/:id/settings", post(settings_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

pub async fn meta_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    let board = app_state.status.read();
    Json(serde_json::json!({
        "tick": app_state.host_tick.load(Ordering::Relaxed),
        "engine_tick": board.tick,
        "ticks_per_sec": app_state.ticks_per_sec,
        "yard_count": board.yards.len(),
        "warnings": board.warnings,
    }))
}

pub async fn yards_handler(State(app_state): State<AppState>) -> Json<Vec<YardStatus>> {
    Json(app_state.status.read().yards.clone())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YardAction {
    Weld,
    Grind,
    Stop,
    ScanGrind,
    ScanWeld,
}

impl YardAction {
    fn into_command(self, yard: YardId) -> Command {
        match self {
            YardAction::Weld => Command::StartWeld { yard },
            YardAction::Grind => Command::StartGrind { yard },
            YardAction::Stop => Command::Stop { yard },
            YardAction::ScanGrind => Command::Scan {
                yard,
                purpose: ScanPurpose::Grind,
            },
            YardAction::ScanWeld => Command::Scan {
                yard,
                purpose: ScanPurpose::Weld,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub action: YardAction,
}

pub async fn command_handler(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CommandRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    if !app_state.status.read().has_yard(&id) {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("unknown yard {id}")})),
        );
    }
    let command = request.action.into_command(YardId(id.clone()));
    app_state.inbox.lock().push(command);
    tracing::info!(yard = %id, action = ?request.action, "command queued");
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"queued": true, "yard": id})),
    )
}

/// Settings for a yard that is not registered yet are kept and applied when
/// it registers.
pub async fn settings_handler(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Json(settings): Json<YardSettings>,
) -> (StatusCode, Json<serde_json::Value>) {
    let settings = settings.sanitized();
    app_state.inbox.lock().push(Command::UpdateSettings {
        yard: YardId(id.clone()),
        settings: settings.clone(),
    });
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"queued": true, "yard": id, "settings": settings})),
    )
}

// ---------------------------------------------------------------------------
// Event stream
// ---------------------------------------------------------------------------

pub async fn stream_handler(
    State(app_state): State<AppState>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = app_state.event_tx.subscribe();
    let host_tick = app_state.host_tick.clone();

    let stream = async_stream::stream! {
        let mut heartbeat = tokio::time::interval(Duration::from_millis(500));
        heartbeat.tick().await; // discard the immediate first tick
        let mut flush = tokio::time::interval(Duration::from_millis(50));
        flush.tick().await; // discard the immediate first tick
        let mut pending: Vec<EventEnvelope> = Vec::new();
        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(events) => pending.extend(events),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "event stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = flush.tick() => {
                    if !pending.is_empty() {
                        let data = serde_json::to_string(&pending).unwrap_or_default();
                        pending.clear();
                        yield Ok(Event::default().data(data));
                    }
                }
                _ = heartbeat.tick() => {
                    let tick = host_tick.load(Ordering::Relaxed);
                    let hb = serde_json::json!({"heartbeat": true, "tick": tick});
                    yield Ok(Event::default().data(hb.to_string()));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use yard_core::ShipyardMode;

    fn status(id: &str) -> YardStatus {
        YardStatus {
            id: YardId(id.to_string()),
            mode: ShipyardMode::Idle,
            mobile: false,
            settings: YardSettings::default(),
            tool_power_kw: vec![5.0; 8],
            max_power_kw: 5.0,
            beams: Vec::new(),
            stalled: Vec::new(),
            missing_components: yard_core::ComponentCounts::new(),
            contained: Vec::new(),
            intersecting: Vec::new(),
            work_set: Vec::new(),
            pending_targets: 0,
            last_scan: None,
        }
    }

    fn test_state() -> AppState {
        let state = AppState::new(10.0);
        state.status.write().yards.push(status("yard_a"));
        state
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn meta_reports_tick_and_yard_count() {
        let state = test_state();
        state.host_tick.store(42, Ordering::Relaxed);
        let app = make_router(state);
        let response = app
            .oneshot(Request::builder().uri("/api/v1/meta").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["tick"], 42);
        assert_eq!(json["yard_count"], 1);
    }

    #[tokio::test]
    async fn yards_lists_published_statuses() {
        let app = make_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/api/v1/yards").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json[0]["id"], "yard_a");
        assert_eq!(json[0]["mode"], "idle");
    }

    #[tokio::test]
    async fn command_is_queued_for_a_known_yard() {
        let state = test_state();
        let app = make_router(state.clone());
        let response = app
            .oneshot(post_json("/api/v1/yards/yard_a/command", r#"{"action":"scan_weld"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let queued = state.inbox.lock().clone();
        assert!(matches!(
            queued.as_slice(),
            [Command::Scan { yard, purpose: ScanPurpose::Weld }] if yard.0 == "yard_a"
        ));
    }

    #[tokio::test]
    async fn command_for_an_unknown_yard_is_404() {
        let state = test_state();
        let app = make_router(state.clone());
        let response = app
            .oneshot(post_json("/api/v1/yards/nope/command", r#"{"action":"grind"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(state.inbox.lock().is_empty());
    }

    #[tokio::test]
    async fn unknown_action_is_rejected() {
        let app = make_router(test_state());
        let response = app
            .oneshot(post_json("/api/v1/yards/yard_a/command", r#"{"action":"launch"}"#))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn settings_are_sanitized_and_queued() {
        let state = test_state();
        let app = make_router(state.clone());
        let response = app
            .oneshot(post_json(
                "/api/v1/yards/yard_a/settings",
                r#"{"beam_count": 9, "grind_multiplier": 0.5}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = body_json(response).await;
        assert_eq!(json["settings"]["beam_count"], 3);

        let queued = state.inbox.lock().clone();
        let [Command::UpdateSettings { settings, .. }] = queued.as_slice() else {
            panic!("expected one settings update, got {queued:?}");
        };
        assert!((settings.grind_multiplier - 0.5).abs() < f32::EPSILON);
    }
}
