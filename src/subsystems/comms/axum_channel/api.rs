//! Axum handlers for the companion REST routes.
//!
//! Each handler receives [`AxumState`] via [`axum::extract::State`] and
//! returns an axum [`Response`]. Errors are JSON `{"error", "message"}`.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::subsystems::comms::state::RequestError;
use crate::subsystems::companion::{Profile, Turn, scenario};

use super::AxumState;

// ── Request types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct IncomingMessage {
    content: String,
    #[serde(default = "default_role")]
    role: String,
    #[serde(default)]
    scenario: Option<String>,
}

fn default_role() -> String {
    "user".to_string()
}

#[derive(Deserialize)]
pub(super) struct Conversation {
    messages: Vec<IncomingMessage>,
}

#[derive(Deserialize)]
pub(super) struct SnapshotQuery {
    filename: Option<String>,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Build a JSON error response body.
fn json_error(code: &str, msg: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({ "error": code, "message": format!("{msg}") }))
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            RequestError::NoCompanion => (StatusCode::NOT_FOUND, "not_found"),
            RequestError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            RequestError::App(e) => {
                warn!("request failed: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        (status, json_error(code, self)).into_response()
    }
}

/// Frontends label the companion's turns `companion`; history uses `assistant`.
fn normalize_role(role: &str) -> &str {
    if role == "companion" { "assistant" } else { role }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// GET /
pub(super) async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Welcome to Virtual Companion API" }))
}

/// POST /companion/profile
pub(super) async fn create_profile(
    State(state): State<AxumState>,
    Json(profile): Json<Profile>,
) -> Response {
    let profile = state.comms.create_companion(&state.channel_id, profile).await;
    Json(json!({ "message": "Profile created successfully", "profile": profile })).into_response()
}

/// GET /companion/profile
pub(super) async fn get_profile(State(state): State<AxumState>) -> Response {
    match state.comms.profile().await {
        Ok(profile) => Json(profile).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /chat: the whole conversation so far; the last message is answered.
pub(super) async fn chat(
    State(state): State<AxumState>,
    Json(conversation): Json<Conversation>,
) -> Response {
    if !state.comms.has_companion().await {
        return RequestError::NoCompanion.into_response();
    }
    let mut messages = conversation.messages;
    let Some(last) = messages.pop() else {
        return RequestError::BadRequest("No messages provided".into()).into_response();
    };

    let history: Vec<Turn> = messages
        .iter()
        .map(|m| {
            let mut turn = Turn::new(normalize_role(&m.role), &m.content, "");
            turn.scenario = m.scenario.clone();
            turn
        })
        .collect();

    match state.comms.chat(history, &last.content, last.scenario.as_deref()).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /scenarios
pub(super) async fn scenarios() -> Json<serde_json::Value> {
    Json(scenario::to_json())
}

/// POST /scenario/{name}
pub(super) async fn set_scenario(
    State(state): State<AxumState>,
    Path(name): Path<String>,
) -> Response {
    match state.comms.set_scenario(&name).await {
        Ok(()) => Json(json!({ "message": format!("Scenario set to {name}") })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /conversation/history
pub(super) async fn history(State(state): State<AxumState>) -> Response {
    match state.comms.history().await {
        Ok(history) => Json(json!({ "history": history })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /conversation/save?filename=
pub(super) async fn save_history(
    State(state): State<AxumState>,
    Query(q): Query<SnapshotQuery>,
) -> Response {
    match state.comms.save_history(q.filename.as_deref()).await {
        Ok(name) => {
            Json(json!({ "message": format!("Conversation history saved to {name}") })).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// POST /conversation/load?filename=
pub(super) async fn load_history(
    State(state): State<AxumState>,
    Query(q): Query<SnapshotQuery>,
) -> Response {
    match state.comms.load_history(q.filename.as_deref()).await {
        Ok(name) => {
            Json(json!({ "message": format!("Conversation history loaded from {name}") })).into_response()
        }
        Err(e) => e.into_response(),
    }
}

// ── Speech ────────────────────────────────────────────────────────────────────

#[cfg(feature = "subsystem-speech")]
#[derive(Deserialize)]
pub(super) struct TtsRequest {
    #[serde(default)]
    text: String,
}

/// POST /tts
#[cfg(feature = "subsystem-speech")]
pub(super) async fn tts(State(state): State<AxumState>, Json(req): Json<TtsRequest>) -> Response {
    if req.text.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, json_error("bad_request", "text is required")).into_response();
    }
    match state.comms.speech().synthesize(&req.text).await {
        Ok(path) => {
            let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            Json(json!({ "audio_url": format!("/audio/{filename}"), "text": req.text })).into_response()
        }
        Err(e) => {
            warn!(channel_id = %state.channel_id, "tts failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, json_error("tts_failed", e)).into_response()
        }
    }
}

/// GET /audio/{filename}
#[cfg(feature = "subsystem-speech")]
pub(super) async fn audio(
    State(state): State<AxumState>,
    Path(filename): Path<String>,
) -> Response {
    let Some(path) = state.comms.speech().resolve_audio(&filename) else {
        return (StatusCode::NOT_FOUND, json_error("not_found", "File not found")).into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "audio/mpeg")],
            bytes,
        )
            .into_response(),
        Err(e) => {
            warn!(file = %path.display(), "audio read failed: {e}");
            (StatusCode::NOT_FOUND, json_error("not_found", "File not found")).into_response()
        }
    }
}

/// POST /asr, multipart field `file`.
#[cfg(feature = "subsystem-speech")]
pub(super) async fn asr(
    State(state): State<AxumState>,
    mut multipart: axum::extract::Multipart,
) -> Response {
    let upload = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                let name = field.file_name().unwrap_or("upload.wav").to_string();
                match field.bytes().await {
                    Ok(bytes) => break Some((name, bytes)),
                    Err(e) => {
                        return (StatusCode::BAD_REQUEST, json_error("bad_request", e)).into_response();
                    }
                }
            }
            Ok(Some(_)) => continue,
            Ok(None) => break None,
            Err(e) => return (StatusCode::BAD_REQUEST, json_error("bad_request", e)).into_response(),
        }
    };
    let Some((name, bytes)) = upload else {
        return (StatusCode::BAD_REQUEST, json_error("bad_request", "file is required")).into_response();
    };

    match state.comms.speech().transcribe_upload(&name, &bytes).await {
        Ok(text) if !text.is_empty() => Json(json!({ "text": text })).into_response(),
        Ok(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, json_error("asr_failed", "ASR failed")).into_response()
        }
        Err(e) => {
            warn!(channel_id = %state.channel_id, "asr failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, json_error("asr_failed", e)).into_response()
        }
    }
}
