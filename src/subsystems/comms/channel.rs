//! Channel supervision for the console and HTTP front ends.
//!
//! Every [`Channel`] runs as its own task inside one [`JoinSet`]. A channel
//! that fails or panics cancels the shared token so its siblings wind down,
//! and the error handed back from [`ChannelsHandle::join`] names the channel
//! that caused it. A channel that stops cleanly (console `exit`, HTTP
//! graceful shutdown) is logged and otherwise left alone.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures_util::FutureExt;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::AppError;

pub type ChannelFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

/// A front end the companion can be reached through.
pub trait Channel: Send + 'static {
    /// Identifier such as `pty0` or `http0`; shows up in logs and errors.
    fn id(&self) -> &str;

    /// Consume the channel and serve until `shutdown` fires or the user leaves.
    fn run(self: Box<Self>, shutdown: CancellationToken) -> ChannelFuture;
}

/// Running channel set. Resolves once every channel has exited.
pub struct ChannelsHandle {
    ids: Vec<String>,
    inner: JoinHandle<Result<(), AppError>>,
}

impl ChannelsHandle {
    /// Ids of the channels that were started, in start order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Wait for all channels; the first failure wins.
    pub async fn join(self) -> Result<(), AppError> {
        self.inner
            .await
            .unwrap_or_else(|e| Err(AppError::Comms(format!("channel supervisor died: {e}"))))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Run one channel, turning a panic into an error tagged with its id.
async fn serve(channel: Box<dyn Channel>, shutdown: CancellationToken) -> (String, Result<(), AppError>) {
    let id = channel.id().to_string();
    let result = match AssertUnwindSafe(channel.run(shutdown)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(AppError::Comms(format!("panicked: {}", panic_message(&*payload)))),
    };
    (id, result)
}

/// Start every channel and supervise them until all have exited.
pub fn supervise(channels: Vec<Box<dyn Channel>>, shutdown: CancellationToken) -> ChannelsHandle {
    let ids: Vec<String> = channels.iter().map(|c| c.id().to_string()).collect();

    let inner = tokio::spawn(async move {
        let mut set = JoinSet::new();
        for channel in channels {
            debug!(channel = channel.id(), "starting channel");
            set.spawn(serve(channel, shutdown.clone()));
        }

        let mut first_err: Option<AppError> = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((id, Ok(()))) => info!(channel = %id, "channel stopped"),
                Ok((id, Err(e))) => {
                    error!(channel = %id, "channel failed: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert_with(|| AppError::Comms(format!("channel {id} failed: {e}")));
                }
                Err(e) => {
                    error!("channel task aborted: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert_with(|| AppError::Comms(format!("channel task aborted: {e}")));
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    });

    ChannelsHandle { ids, inner }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Idle(&'static str);

    impl Channel for Idle {
        fn id(&self) -> &str {
            self.0
        }
        fn run(self: Box<Self>, shutdown: CancellationToken) -> ChannelFuture {
            Box::pin(async move {
                shutdown.cancelled().await;
                Ok(())
            })
        }
    }

    struct BindFails;

    impl Channel for BindFails {
        fn id(&self) -> &str {
            "http0"
        }
        fn run(self: Box<Self>, _shutdown: CancellationToken) -> ChannelFuture {
            Box::pin(async { Err(AppError::Comms("address in use".into())) })
        }
    }

    struct Panics;

    impl Channel for Panics {
        fn id(&self) -> &str {
            "pty0"
        }
        fn run(self: Box<Self>, _shutdown: CancellationToken) -> ChannelFuture {
            Box::pin(async {
                if true {
                    panic!("stdin closed unexpectedly");
                }
                Ok::<(), AppError>(())
            })
        }
    }

    #[tokio::test]
    async fn no_channels_resolves_immediately() {
        let handle = supervise(Vec::new(), CancellationToken::new());
        assert!(handle.ids().is_empty());
        assert!(handle.join().await.is_ok());
    }

    #[tokio::test]
    async fn failure_names_channel_and_stops_siblings() {
        let shutdown = CancellationToken::new();
        let handle = supervise(vec![Box::new(Idle("pty0")), Box::new(BindFails)], shutdown.clone());
        assert_eq!(handle.ids(), ["pty0", "http0"]);

        let err = handle.join().await.unwrap_err().to_string();
        assert!(err.contains("channel http0 failed"), "{err}");
        assert!(err.contains("address in use"), "{err}");
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn panic_is_reported_against_channel() {
        let shutdown = CancellationToken::new();
        let handle = supervise(vec![Box::new(Panics), Box::new(Idle("http0"))], shutdown.clone());

        let err = handle.join().await.unwrap_err().to_string();
        assert!(err.contains("channel pty0 failed"), "{err}");
        assert!(err.contains("stdin closed unexpectedly"), "{err}");
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn clean_shutdown_returns_ok() {
        let shutdown = CancellationToken::new();
        let handle = supervise(vec![Box::new(Idle("http0"))], shutdown.clone());
        shutdown.cancel();
        assert!(handle.join().await.is_ok());
    }
}
