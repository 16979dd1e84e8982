//! Comms subsystem — manages the companion's I/O channels.
//!
//! # Architecture
//!
//! Each channel (PTY, HTTP) implements [`channel::Channel`] and is spawned
//! as an independent concurrent task by [`start`] via [`channel::supervise`].
//! Channels capture their shared [`Arc<CommsState>`] at construction time;
//! no state is passed through `Channel::run`.
//!
//! An intra-subsystem [`mpsc`] channel lets running channels signal the
//! comms manager (lifecycle events). This is drained in a short-lived
//! background task that dies naturally when all senders are dropped.
//!
//! # Starting
//!
//! [`start`] is synchronous: it returns a [`ChannelsHandle`] as soon as
//! the tasks are spawned. The caller decides when (or whether) to await it.

pub mod channel;
mod state;
#[cfg(feature = "channel-pty")]
pub mod pty;
#[cfg(feature = "channel-axum")]
pub mod axum_channel;

pub use channel::ChannelsHandle;
pub use state::{ChatReply, CommsEvent, CommsState, DEFAULT_SNAPSHOT, RequestError};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use channel::{Channel, supervise};

/// Capacity of the channel → manager event queue.
pub const EVENT_CAPACITY: usize = 32;

// ── start ───────────────────────────────────────────────────────────────────

/// Spawn all configured comms channels and return a [`ChannelsHandle`].
///
/// Channels start immediately. If any channel exits with an error the shared
/// `shutdown` token is cancelled so siblings stop cooperatively. The handle
/// resolves when all channels have exited.
pub fn start(
    config: &Config,
    state: Arc<CommsState>,
    event_rx: mpsc::Receiver<CommsEvent>,
    shutdown: CancellationToken,
) -> ChannelsHandle {
    let mut channels: Vec<Box<dyn Channel>> = Vec::new();

    #[cfg(feature = "channel-pty")]
    {
        if config.comms_pty_should_load() {
            info!("loading pty channel");
            channels.push(Box::new(pty::PtyChannel::new(
                "pty0",
                config.companion.name.clone(),
                state.clone(),
            )));
        }
    }

    #[cfg(feature = "channel-axum")]
    {
        if config.comms_http_should_load() {
            info!(bind = %config.comms.http.bind, "loading axum channel");
            channels.push(Box::new(axum_channel::AxumChannel::new(
                "http0",
                config.comms.http.bind.clone(),
                state.clone(),
            )));
        }
    }

    if channels.is_empty() {
        info!("no comms channels configured");
    }
    drop(state);

    // Monitoring-only drain; ends when every CommsState clone is gone.
    tokio::spawn(async move {
        let mut rx = event_rx;
        while let Some(event) = rx.recv().await {
            match event {
                CommsEvent::ChannelShutdown { ref channel_id } => {
                    debug!(channel_id, "channel reported shutdown");
                }
                CommsEvent::CompanionCreated { ref channel_id, ref name } => {
                    debug!(channel_id, name, "companion created");
                }
            }
        }
    });

    let handle = supervise(channels, shutdown);
    if !handle.ids().is_empty() {
        info!(channels = ?handle.ids(), "comms channels started");
    }
    handle
}
