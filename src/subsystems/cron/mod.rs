//! Cron subsystem — background timer service that emits named events.
//!
//! [`start`] spawns a single background tokio task that uses
//! `tokio::time::sleep_until` to park until the next deadline. There is no
//! polling: the task wakes only when a timer fires, a command arrives on its
//! internal channel, or shutdown is requested.
//!
//! Consumers schedule through a [`CronHandle`] and read fired [`CronEvent`]s
//! from the receiver returned alongside it. The auto companion in [`auto`]
//! is the only consumer today.

pub mod auto;
mod service;

pub use service::{CronEntryInfo, CronEvent, ScheduleSpec};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::AppError;
use service::{CronCommand, CronService};

/// Queue depth for commands and fired events.
const CHANNEL_CAPACITY: usize = 64;

/// Cheap, cloneable front to the timer task.
#[derive(Clone)]
pub struct CronHandle {
    cmd_tx: mpsc::Sender<CronCommand>,
}

/// Spawn the timer task. Returns the scheduling handle and the event stream.
pub fn start(shutdown: CancellationToken) -> (CronHandle, mpsc::Receiver<CronEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(CronService::new(cmd_rx, events_tx, shutdown).run());
    debug!("cron subsystem started");
    (CronHandle { cmd_tx }, events_rx)
}

fn not_running() -> AppError {
    AppError::Cron("cron service not running".into())
}

impl CronHandle {
    /// Register `name` under `spec`; returns the schedule id.
    pub async fn schedule(&self, name: &str, spec: ScheduleSpec) -> Result<String, AppError> {
        if let ScheduleSpec::Interval { every_secs: 0 } = spec {
            return Err(AppError::Cron("interval every_secs must be > 0".into()));
        }
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(CronCommand::Schedule { name: name.to_string(), spec, reply })
            .await
            .map_err(|_| not_running())?;
        rx.await.map_err(|_| not_running())
    }

    /// Remove a schedule; `false` when the id is unknown.
    pub async fn cancel(&self, schedule_id: &str) -> Result<bool, AppError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(CronCommand::Cancel { schedule_id: schedule_id.to_string(), reply })
            .await
            .map_err(|_| not_running())?;
        rx.await.map_err(|_| not_running())
    }

    pub async fn list(&self) -> Result<Vec<CronEntryInfo>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(CronCommand::List { reply })
            .await
            .map_err(|_| not_running())?;
        rx.await.map_err(|_| not_running())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_interval_rejected() {
        let shutdown = CancellationToken::new();
        let (cron, _events) = start(shutdown.clone());
        assert!(cron.schedule("x", ScheduleSpec::Interval { every_secs: 0 }).await.is_err());
        shutdown.cancel();
    }

    #[tokio::test]
    async fn handle_round_trip() {
        let shutdown = CancellationToken::new();
        let (cron, _events) = start(shutdown.clone());
        let id = cron.schedule("morning_greeting", ScheduleSpec::Daily { hour: 8, minute: 0 }).await.unwrap();
        let listed = cron.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].spec, ScheduleSpec::Daily { hour: 8, minute: 0 });
        assert!(cron.cancel(&id).await.unwrap());
        assert!(cron.list().await.unwrap().is_empty());
        shutdown.cancel();
    }

    #[tokio::test]
    async fn stopped_service_reports_error() {
        let shutdown = CancellationToken::new();
        let (cron, _events) = start(shutdown.clone());
        shutdown.cancel();
        // The run-loop exits and drops its receiver.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(cron.list().await.is_err());
    }
}
