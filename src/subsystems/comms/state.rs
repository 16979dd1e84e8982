//! Shared state for the Comms subsystem — capability boundary for channels.
//!
//! Channels (and the auto companion) receive an `Arc<CommsState>` and are
//! restricted to the typed methods below. The companion itself is private;
//! every access goes through the async mutex so requests are handled one at
//! a time per companion.
//!
//! # Intra-subsystem events
//!
//! [`CommsState::report_event`] lets a running channel signal the comms
//! subsystem manager without touching the companion. The manager owns the
//! receiver end.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::{Config, is_plain_file_name};
use crate::error::AppError;
use crate::subsystems::companion::emotion::EmotionalState;
use crate::subsystems::companion::{BehaviorPatterns, Companion, CompanionServices, Profile, Turn};
use crate::subsystems::memory::MemoryHandle;
#[cfg(feature = "subsystem-speech")]
use crate::subsystems::speech::SpeechService;

/// Snapshot file used when a request names none.
pub const DEFAULT_SNAPSHOT: &str = "conversation_history.json";

/// Proactive messages buffered for slow subscribers.
const OUTBOUND_CAPACITY: usize = 32;

// ── Events ────────────────────────────────────────────────────────────────────

/// Events a channel sends back to the comms subsystem manager.
#[derive(Debug)]
pub enum CommsEvent {
    /// Channel has stopped (clean exit or EOF).
    ChannelShutdown { channel_id: String },
    /// A companion profile was (re)created.
    CompanionCreated { channel_id: String, name: String },
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failure modes of a companion request, mapped to status codes by the
/// HTTP channel.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Companion profile not created")]
    NoCompanion,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    App(#[from] AppError),
}

/// Reply body of one chat exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub text: String,
    pub emotional_state: EmotionalState,
    pub behavior_patterns: BehaviorPatterns,
    pub current_scenario: String,
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Shared state passed as `Arc<CommsState>` to every channel task.
pub struct CommsState {
    services: CompanionServices,
    /// Profile used when the console or the auto companion needs a companion
    /// before one was created over HTTP.
    default_profile: Profile,
    work_dir: PathBuf,
    companion: Mutex<Option<Companion>>,
    memory: MemoryHandle,
    #[cfg(feature = "subsystem-speech")]
    speech: SpeechService,
    last_interaction: std::sync::Mutex<Instant>,
    outbound: broadcast::Sender<String>,
    /// Back-channel to the comms subsystem manager.
    event_tx: mpsc::Sender<CommsEvent>,
}

impl CommsState {
    pub fn new(
        config: &Config,
        services: CompanionServices,
        event_tx: mpsc::Sender<CommsEvent>,
    ) -> Self {
        let default_profile = Profile::from_config(config);
        let memory = MemoryHandle::new(&config.memory, &default_profile.name);
        let (outbound, _) = broadcast::channel(OUTBOUND_CAPACITY);
        Self {
            services,
            default_profile,
            work_dir: config.work_dir.clone(),
            companion: Mutex::new(None),
            memory,
            #[cfg(feature = "subsystem-speech")]
            speech: SpeechService::new(config.speech.clone()),
            last_interaction: std::sync::Mutex::new(Instant::now()),
            outbound,
            event_tx,
        }
    }

    // ── companion lifecycle ──────────────────────────────────────────────────

    /// Replace the current companion and return its profile JSON.
    pub async fn create_companion(&self, channel_id: &str, profile: Profile) -> serde_json::Value {
        let name = profile.name.clone();
        let companion = Companion::new(profile, &self.services);
        let snapshot = companion.profile();
        *self.companion.lock().await = Some(companion);
        info!(%channel_id, %name, "companion created");
        self.report_event(CommsEvent::CompanionCreated { channel_id: channel_id.to_string(), name });
        snapshot
    }

    pub async fn profile(&self) -> Result<serde_json::Value, RequestError> {
        let guard = self.companion.lock().await;
        guard.as_ref().map(Companion::profile).ok_or(RequestError::NoCompanion)
    }

    /// Create the default companion unless one exists.
    pub async fn ensure_companion(&self) {
        let mut guard = self.companion.lock().await;
        if guard.is_none() {
            info!(name = %self.default_profile.name, "creating default companion");
            *guard = Some(Companion::new(self.default_profile.clone(), &self.services));
        }
    }

    pub async fn has_companion(&self) -> bool {
        self.companion.lock().await.is_some()
    }

    // ── messaging ────────────────────────────────────────────────────────────

    /// Console path: run `content` through the pipeline, creating the default
    /// companion on first use.
    pub async fn send_message(&self, channel_id: &str, content: String) -> Result<String, AppError> {
        let mut guard = self.companion.lock().await;
        let companion = guard.get_or_insert_with(|| {
            info!(%channel_id, name = %self.default_profile.name, "creating default companion");
            Companion::new(self.default_profile.clone(), &self.services)
        });
        let reply = companion.process_message(&content, None).await;
        drop(guard);
        self.touch();
        Ok(reply)
    }

    /// HTTP path: replace history with `history`, then answer `message`.
    pub async fn chat(
        &self,
        history: Vec<Turn>,
        message: &str,
        scenario: Option<&str>,
    ) -> Result<ChatReply, RequestError> {
        let mut guard = self.companion.lock().await;
        let companion = guard.as_mut().ok_or(RequestError::NoCompanion)?;
        companion.replace_history(history);
        let text = companion.process_message(message, scenario).await;
        let reply = ChatReply {
            text,
            emotional_state: companion.emotional_state().clone(),
            behavior_patterns: companion.behavior_patterns().clone(),
            current_scenario: companion.current_scenario().to_string(),
        };
        drop(guard);
        self.touch();
        Ok(reply)
    }

    /// Auto-companion path: process a canned message and broadcast the reply.
    pub async fn auto_message(&self, message: &str) -> Result<String, AppError> {
        info!(message, "sending auto message");
        let reply = self.send_message("auto", message.to_string()).await?;
        self.announce(&reply);
        Ok(reply)
    }

    /// Broadcast a proactive message to every subscribed channel.
    pub fn announce(&self, text: &str) {
        // No subscribers is normal when only the HTTP channel is loaded.
        if self.outbound.send(text.to_string()).is_err() {
            info!(text, "proactive message (no console attached)");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.outbound.subscribe()
    }

    // ── style / scenario ─────────────────────────────────────────────────────

    /// Switch the style of the current (or default) companion.
    pub async fn set_style(&self, style_type: &str) {
        let mut guard = self.companion.lock().await;
        match guard.as_mut() {
            Some(c) => c.set_style(style_type),
            None => {
                let mut profile = self.default_profile.clone();
                profile.style_type = style_type.to_string();
                *guard = Some(Companion::new(profile, &self.services));
            }
        }
        info!(style = style_type, "style selected");
    }

    /// Advance the companion's style rotation; `None` without a companion.
    pub async fn rotate_style(&self) -> Option<String> {
        let mut guard = self.companion.lock().await;
        guard.as_mut().map(|c| c.rotate_style().to_string())
    }

    pub async fn style_type(&self) -> Option<String> {
        self.companion.lock().await.as_ref().map(|c| c.style_type().to_string())
    }

    pub async fn set_scenario(&self, name: &str) -> Result<(), RequestError> {
        let mut guard = self.companion.lock().await;
        let companion = guard.as_mut().ok_or(RequestError::NoCompanion)?;
        if companion.set_scenario(name) {
            Ok(())
        } else {
            Err(RequestError::BadRequest("Invalid scenario".into()))
        }
    }

    // ── history snapshots ────────────────────────────────────────────────────

    pub async fn history(&self) -> Result<Vec<Turn>, RequestError> {
        let guard = self.companion.lock().await;
        guard.as_ref().map(|c| c.history().to_vec()).ok_or(RequestError::NoCompanion)
    }

    fn snapshot_path(&self, filename: Option<&str>) -> Result<PathBuf, RequestError> {
        let name = filename.unwrap_or(DEFAULT_SNAPSHOT);
        if !is_plain_file_name(name) {
            return Err(RequestError::BadRequest(format!("invalid filename '{name}'")));
        }
        Ok(self.work_dir.join(name))
    }

    /// Save to `work_dir/filename`; returns the file name used.
    pub async fn save_history(&self, filename: Option<&str>) -> Result<String, RequestError> {
        let guard = self.companion.lock().await;
        let companion = guard.as_ref().ok_or(RequestError::NoCompanion)?;
        let path = self.snapshot_path(filename)?;
        companion.save_history(&path).await?;
        Ok(filename.unwrap_or(DEFAULT_SNAPSHOT).to_string())
    }

    pub async fn load_history(&self, filename: Option<&str>) -> Result<String, RequestError> {
        let mut guard = self.companion.lock().await;
        let companion = guard.as_mut().ok_or(RequestError::NoCompanion)?;
        let path = self.snapshot_path(filename)?;
        companion.load_history(&path).await?;
        Ok(filename.unwrap_or(DEFAULT_SNAPSHOT).to_string())
    }

    // ── shared services ──────────────────────────────────────────────────────

    pub fn memory(&self) -> &MemoryHandle {
        &self.memory
    }

    #[cfg(feature = "subsystem-speech")]
    pub fn speech(&self) -> &SpeechService {
        &self.speech
    }

    // ── activity tracking ────────────────────────────────────────────────────

    /// Mark "now" as the latest interaction.
    pub fn touch(&self) {
        let mut last = self.last_interaction.lock().unwrap_or_else(|p| p.into_inner());
        *last = Instant::now();
    }

    /// Time since the latest interaction.
    pub fn idle_for(&self) -> Duration {
        let last = self.last_interaction.lock().unwrap_or_else(|p| p.into_inner());
        last.elapsed()
    }

    // ── events ───────────────────────────────────────────────────────────────

    /// Report an event to the comms subsystem manager.
    ///
    /// Non-blocking: drops the event and logs a warning if the manager is not
    /// keeping up (channel full) or has already exited (closed).
    pub fn report_event(&self, event: CommsEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("comms event dropped: {e}");
        }
    }
}
