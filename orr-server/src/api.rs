//! REST API and SSE routes

use crate::playback;
use crate::state::AppState;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt as FuturesStreamExt};
use orr_core::{ReplayEngine, ReplayInfo, SessionData, SessionTime, SnapshotMask, TimeSpan, Timeline};
use orr_sources::NdjsonSession;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", get(list_sessions))
        .route("/api/session/load", post(session_load))
        .route(
            "/api/session/upload",
            post(session_upload).layer(DefaultBodyLimit::max(64 * 1024 * 1024)),
        )
        .route("/api/replay/info", get(replay_info))
        .route("/api/replay/state", get(replay_state))
        .route("/api/replay/stream", get(replay_stream))
        .route("/api/replay/control", post(replay_control))
        .route("/api/replay", delete(replay_delete))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// === Session Endpoints ===

#[derive(Serialize)]
struct SessionEntry {
    name: String,
    available: bool,
}

async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionEntry>> {
    let sources = state.sources.read().await;

    let entries: Vec<SessionEntry> = sources
        .iter()
        .map(|source| SessionEntry {
            name: source.name().to_string(),
            available: source.available(),
        })
        .collect();

    Json(entries)
}

#[derive(Deserialize)]
struct LoadRequest {
    name: String,
}

async fn session_load(
    State(state): State<AppState>,
    Json(request): Json<LoadRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    {
        let engine = state.engine.read().await;
        if engine.is_some() {
            return Err((
                StatusCode::CONFLICT,
                "A replay is already active. Delete it first.".to_string(),
            ));
        }
    }

    let data = {
        let sources = state.sources.read().await;
        let source = sources
            .iter()
            .find(|s| s.name() == request.name)
            .ok_or((
                StatusCode::NOT_FOUND,
                format!("Unknown session: {}", request.name),
            ))?;
        source.load().map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to load session: {e}"),
            )
        })?
    };

    let info = start_replay(&state, data).await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "info": info
    })))
}

/// Handle NDJSON session upload, persist it to the sessions directory,
/// and start playback
async fn session_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    {
        let engine = state.engine.read().await;
        if engine.is_some() {
            return Err((
                StatusCode::CONFLICT,
                "A replay is already active. Delete it first.".to_string(),
            ));
        }
    }

    let field = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read upload: {e}")))?
        .ok_or((StatusCode::BAD_REQUEST, "No file provided".to_string()))?;

    let file_name = field.file_name().unwrap_or("upload.ndjson").to_string();

    if !file_name.to_lowercase().ends_with(".ndjson") {
        return Err((
            StatusCode::BAD_REQUEST,
            "Only .ndjson session files are supported".to_string(),
        ));
    }

    let data = field
        .bytes()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read file data: {e}")))?;

    info!("Received session file: {} ({} bytes)", file_name, data.len());

    let text = String::from_utf8(data.to_vec())
        .map_err(|_| (StatusCode::BAD_REQUEST, "Session file is not valid UTF-8".to_string()))?;

    let (samples, track_status, skipped) = orr_sources::ndjson::parse_ndjson(&text);
    if skipped > 0 {
        warn!("{}: skipped {} unparseable lines", file_name, skipped);
    }

    let name = file_name.trim_end_matches(".ndjson").to_string();

    let info = start_replay(
        &state,
        SessionData {
            name: name.clone(),
            samples,
            track_status,
        },
    )
    .await?;

    // Persist compressed so the session shows up as a source next start.
    // Only sessions that actually built a timeline are worth keeping.
    let stored = state.sessions_dir.join(format!("{name}.ndjson.zst"));
    let persisted = std::fs::create_dir_all(&state.sessions_dir)
        .and_then(|_| {
            let compressed = zstd::encode_all(text.as_bytes(), 0)?;
            std::fs::write(&stored, compressed)
        })
        .is_ok();
    if persisted {
        let already_known = {
            let sources = state.sources.read().await;
            sources.iter().any(|s| s.name() == name)
        };
        if !already_known {
            state
                .register_source(Box::new(NdjsonSession::new(&stored)))
                .await;
        }
    } else {
        warn!("Failed to persist uploaded session to {}", stored.display());
    }

    Ok(Json(serde_json::json!({
        "status": "ok",
        "info": info,
        "skipped_lines": skipped
    })))
}

/// Build the timeline, install the engine and start the tick task.
async fn start_replay(
    state: &AppState,
    data: SessionData,
) -> Result<ReplayInfo, (StatusCode, String)> {
    let timeline = Timeline::build_with_status(&data.samples, &data.track_status)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    for dropped in timeline.dropped() {
        warn!(
            "dropped sample {} for {}: {}",
            dropped.index, dropped.driver, dropped.reason
        );
    }

    let engine = ReplayEngine::new(data.name, timeline)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    let info = engine.info();
    let initial = engine.snapshot();

    {
        let mut slot = state.engine.write().await;
        *slot = Some(engine);
    }

    playback::start(state.clone()).await;
    let _ = state.state_tx.send(initial);

    info!(
        "replay started: {} ({} events, {} laps)",
        info.session, info.total_events, info.total_laps
    );
    Ok(info)
}

// === Replay Endpoints ===

async fn replay_info(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let engine = state.engine.read().await;
    match &*engine {
        Some(engine) => Ok(Json(serde_json::json!(engine.info()))),
        None => Err((StatusCode::NOT_FOUND, "No active replay".to_string())),
    }
}

async fn replay_state(
    State(state): State<AppState>,
) -> Result<Json<orr_core::RaceState>, (StatusCode, String)> {
    let engine = state.engine.read().await;
    match &*engine {
        Some(engine) => Ok(Json(engine.snapshot())),
        None => Err((StatusCode::NOT_FOUND, "No active replay".to_string())),
    }
}

#[derive(Deserialize)]
struct StreamQuery {
    fields: Option<String>,
}

async fn replay_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.subscribe();
    let mask = query.fields.map(|f| SnapshotMask::parse(&f));

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let mask = mask.clone();
        async move {
            match result {
                Ok(snapshot) => match snapshot.to_json_filtered(mask.as_ref()) {
                    Ok(json) => Some(Ok(Event::default().data(json))),
                    Err(e) => {
                        tracing::error!("Failed to serialize snapshot: {}", e);
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!("Broadcast stream error: {}", e);
                    None
                }
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
struct ControlRequest {
    action: String,
    value: Option<f64>,
}

async fn replay_control(
    State(state): State<AppState>,
    Json(request): Json<ControlRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let response = {
        let mut engine = state.engine.write().await;
        let engine = engine
            .as_mut()
            .ok_or((StatusCode::NOT_FOUND, "No active replay".to_string()))?;

        let response = match request.action.as_str() {
            "play" => {
                engine.play();
                serde_json::json!({"status": "playing", "speed": engine.clock().speed()})
            }
            "pause" => {
                engine.pause();
                serde_json::json!({"status": "paused"})
            }
            "speed" => {
                let speed = request.value.ok_or((
                    StatusCode::BAD_REQUEST,
                    "Missing 'value' for speed".to_string(),
                ))?;
                engine.set_speed(speed);
                serde_json::json!({"status": "speed_set", "speed": engine.clock().speed()})
            }
            "seek" => {
                let secs = request.value.ok_or((
                    StatusCode::BAD_REQUEST,
                    "Missing 'value' for seek".to_string(),
                ))?;
                let snapshot = engine.seek_to(SessionTime::from_secs_f64(secs));
                serde_json::json!({"status": "seeked", "current": snapshot.time})
            }
            "seek_by" => {
                let secs = request.value.ok_or((
                    StatusCode::BAD_REQUEST,
                    "Missing 'value' for seek_by".to_string(),
                ))?;
                let snapshot = engine.seek_by(TimeSpan::from_secs_f64(secs));
                serde_json::json!({"status": "seeked", "current": snapshot.time})
            }
            _ => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    format!("Unknown action: {}", request.action),
                ))
            }
        };

        // Controls take effect before the next published snapshot.
        let _ = state.state_tx.send(engine.snapshot());
        response
    };

    Ok(Json(response))
}

async fn replay_delete(
    State(state): State<AppState>,
) -> Result<StatusCode, (StatusCode, String)> {
    {
        let mut cancel = state.playback_cancel.write().await;
        if let Some(token) = cancel.take() {
            token.cancel();
        }
    }

    {
        let mut engine = state.engine.write().await;
        if engine.is_none() {
            return Err((StatusCode::NOT_FOUND, "No active replay".to_string()));
        }
        *engine = None;
    }

    info!("Replay stopped and cleaned up");
    Ok(StatusCode::NO_CONTENT)
}
