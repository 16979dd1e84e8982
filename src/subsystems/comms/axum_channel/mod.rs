//! Axum-based HTTP channel — the companion's REST surface.
//!
//! Implements [`Channel`] so it slots into the comms subsystem lifecycle:
//! `run()` drives the axum event loop; the shared [`CancellationToken`] is
//! wired to axum's graceful shutdown. CORS is fully permissive so a browser
//! front end on any origin can call it.
//!
//! ## URL layout
//!
//! ```text
//! GET  /
//! POST /companion/profile
//! GET  /companion/profile
//! POST /chat
//! GET  /scenarios
//! POST /scenario/{name}
//! GET  /conversation/history
//! POST /conversation/save?filename=
//! POST /conversation/load?filename=
//! POST /tts                        (subsystem-speech)
//! GET  /audio/{filename}           (subsystem-speech)
//! POST /asr                        (subsystem-speech, multipart `file`)
//! ```

mod api;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::AppError;
use super::channel::{Channel, ChannelFuture};
use super::state::CommsState;

/// Largest accepted request body (audio uploads included).
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

// ── Shared request state ──────────────────────────────────────────────────────

/// Axum router state injected into every handler via [`axum::extract::State`].
///
/// Cheap to clone; all fields are reference-counted.
#[derive(Clone)]
pub(crate) struct AxumState {
    /// Channel identifier used in log spans.
    pub channel_id: Arc<str>,
    pub comms: Arc<CommsState>,
}

// ── AxumChannel ───────────────────────────────────────────────────────────────

pub struct AxumChannel {
    channel_id: String,
    bind_addr: String,
    state: Arc<CommsState>,
}

impl AxumChannel {
    pub fn new(
        channel_id: impl Into<String>,
        bind_addr: impl Into<String>,
        state: Arc<CommsState>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            bind_addr: bind_addr.into(),
            state,
        }
    }
}

impl Channel for AxumChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ChannelFuture {
        Box::pin(run_axum(self.channel_id, self.bind_addr, self.state, shutdown))
    }
}

// ── Server loop ───────────────────────────────────────────────────────────────

async fn run_axum(
    channel_id: String,
    bind_addr: String,
    comms: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let router = build_router(&channel_id, comms);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Comms(format!("axum bind failed on {bind_addr}: {e}")))?;

    info!(%channel_id, %bind_addr, "axum channel listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Comms(format!("axum server error: {e}")))?;

    info!(%channel_id, "axum channel shut down");
    Ok(())
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Build the full REST router over `comms`.
pub fn build_router(channel_id: &str, comms: Arc<CommsState>) -> Router {
    let state = AxumState {
        channel_id: Arc::from(channel_id),
        comms,
    };

    let router = Router::new()
        .route("/",                     get(api::root))
        .route("/companion/profile",    post(api::create_profile).get(api::get_profile))
        .route("/chat",                 post(api::chat))
        .route("/scenarios",            get(api::scenarios))
        .route("/scenario/{name}",      post(api::set_scenario))
        .route("/conversation/history", get(api::history))
        .route("/conversation/save",    post(api::save_history))
        .route("/conversation/load",    post(api::load_history));

    #[cfg(feature = "subsystem-speech")]
    let router = router
        .route("/tts",              post(api::tts))
        .route("/audio/{filename}", get(api::audio))
        .route("/asr",              post(api::asr));

    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
