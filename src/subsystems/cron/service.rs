//! Background timer task — the cron service run-loop.
//!
//! Maintains a `BTreeMap<Instant, ScheduleEntry>` priority queue and sleeps
//! until the next deadline via `tokio::time::sleep_until`. Zero polling.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{Local, NaiveTime, TimeDelta};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Daily deadlines closer than this are pushed to the following day, so a
/// timer that wakes a hair early cannot fire twice.
const DAILY_MIN_LEAD: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

// ── Schedule spec ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleSpec {
    /// Every day at local `hour:minute`.
    Daily { hour: u32, minute: u32 },
    /// Repeating, first firing `every_secs` from now.
    Interval { every_secs: u64 },
    /// One-shot after `delay_secs`.
    Once { delay_secs: u64 },
}

/// A fired schedule, delivered to the event consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronEvent {
    pub schedule_id: String,
    pub name: String,
}

/// Snapshot of one queued schedule.
#[derive(Debug, Clone, Serialize)]
pub struct CronEntryInfo {
    pub schedule_id: String,
    pub name: String,
    pub spec: ScheduleSpec,
    /// Time until the next firing.
    pub due_in_secs: u64,
}

// ── Commands ─────────────────────────────────────────────────────────────────

/// Internal command sent from [`super::CronHandle`] to the background task.
pub enum CronCommand {
    Schedule {
        name: String,
        spec: ScheduleSpec,
        reply: oneshot::Sender<String>, // schedule_id
    },
    Cancel {
        schedule_id: String,
        reply: oneshot::Sender<bool>, // true if found and removed
    },
    List {
        reply: oneshot::Sender<Vec<CronEntryInfo>>,
    },
}

// ── Schedule entry ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct ScheduleEntry {
    id: String,
    name: String,
    spec: ScheduleSpec,
}

// ── Service ──────────────────────────────────────────────────────────────────

/// The background timer service. Created by [`super::start`] and spawned as
/// a tokio task.
pub struct CronService {
    cmd_rx: mpsc::Receiver<CronCommand>,
    events_tx: mpsc::Sender<CronEvent>,
    shutdown: CancellationToken,
}

impl CronService {
    pub fn new(
        cmd_rx: mpsc::Receiver<CronCommand>,
        events_tx: mpsc::Sender<CronEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self { cmd_rx, events_tx, shutdown }
    }

    /// Run the timer loop until shutdown.
    pub async fn run(mut self) {
        // Deadline → entry. When two entries share the same instant the later
        // one is nudged by 1ns to keep keys unique.
        let mut queue: BTreeMap<Instant, ScheduleEntry> = BTreeMap::new();
        // schedule_id → deadline, for cancel.
        let mut id_to_deadline: HashMap<String, Instant> = HashMap::new();

        info!("cron service running");

        loop {
            let next_deadline = queue.keys().next().copied();

            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("cron service shutting down ({} active schedules dropped)", queue.len());
                    break;
                }

                Some(cmd) = self.cmd_rx.recv() => {
                    match cmd {
                        CronCommand::Schedule { name, spec, reply } => {
                            let id = Uuid::new_v4().to_string();
                            let deadline = first_deadline(&spec);
                            let entry = ScheduleEntry { id: id.clone(), name: name.clone(), spec };
                            let deadline = insert_unique(&mut queue, deadline, entry);
                            id_to_deadline.insert(id.clone(), deadline);
                            debug!(schedule_id = %id, %name, ?spec, "scheduled");
                            let _ = reply.send(id);
                        }
                        CronCommand::Cancel { schedule_id, reply } => {
                            let removed = match id_to_deadline.remove(&schedule_id) {
                                Some(deadline) => {
                                    queue.remove(&deadline);
                                    debug!(%schedule_id, "cancelled");
                                    true
                                }
                                None => {
                                    debug!(%schedule_id, "cancel: not found");
                                    false
                                }
                            };
                            let _ = reply.send(removed);
                        }
                        CronCommand::List { reply } => {
                            let now = Instant::now();
                            let entries: Vec<CronEntryInfo> = queue
                                .iter()
                                .map(|(deadline, entry)| CronEntryInfo {
                                    schedule_id: entry.id.clone(),
                                    name: entry.name.clone(),
                                    spec: entry.spec,
                                    due_in_secs: deadline.saturating_duration_since(now).as_secs(),
                                })
                                .collect();
                            trace!(count = entries.len(), "listing schedules");
                            let _ = reply.send(entries);
                        }
                    }
                }

                _ = async {
                    match next_deadline {
                        Some(d) => tokio::time::sleep_until(d).await,
                        None => std::future::pending().await,
                    }
                } => {
                    let Some((deadline, entry)) = queue.pop_first() else { continue };
                    id_to_deadline.remove(&entry.id);
                    debug!(schedule_id = %entry.id, name = %entry.name, "cron firing");

                    let event = CronEvent { schedule_id: entry.id.clone(), name: entry.name.clone() };
                    if let Err(e) = self.events_tx.try_send(event) {
                        warn!(schedule_id = %entry.id, name = %entry.name, "cron event dropped: {e}");
                    }

                    if let Some(next) = next_deadline_after(&entry.spec, deadline) {
                        let id = entry.id.clone();
                        let next = insert_unique(&mut queue, next, entry);
                        id_to_deadline.insert(id, next);
                    }
                }
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn first_deadline(spec: &ScheduleSpec) -> Instant {
    let now = Instant::now();
    match *spec {
        ScheduleSpec::Daily { hour, minute } => now + until_daily(hour, minute),
        ScheduleSpec::Interval { every_secs } => now + Duration::from_secs(every_secs),
        ScheduleSpec::Once { delay_secs } => now + Duration::from_secs(delay_secs),
    }
}

/// Re-enqueue deadline for repeating specs; `None` for one-shots.
fn next_deadline_after(spec: &ScheduleSpec, fired_at: Instant) -> Option<Instant> {
    match *spec {
        ScheduleSpec::Daily { hour, minute } => Some(Instant::now() + until_daily(hour, minute)),
        ScheduleSpec::Interval { every_secs } => Some(fired_at + Duration::from_secs(every_secs)),
        ScheduleSpec::Once { .. } => None,
    }
}

/// Wall-clock time until the next local `hour:minute`.
fn until_daily(hour: u32, minute: u32) -> Duration {
    let Some(at) = NaiveTime::from_hms_opt(hour, minute, 0) else {
        warn!(hour, minute, "invalid daily time, using 24h");
        return DAY;
    };
    let now = Local::now().naive_local();
    let mut target = now.date().and_time(at);
    if target <= now {
        target += TimeDelta::days(1);
    }
    let until = (target - now).to_std().unwrap_or(DAY);
    if until < DAILY_MIN_LEAD { until + DAY } else { until }
}

/// Insert into the BTreeMap, nudging the key by 1ns if it already exists
/// to guarantee unique keys. Returns the actual key used.
fn insert_unique(
    queue: &mut BTreeMap<Instant, ScheduleEntry>,
    mut deadline: Instant,
    entry: ScheduleEntry,
) -> Instant {
    while queue.contains_key(&deadline) {
        deadline += Duration::from_nanos(1);
    }
    queue.insert(deadline, entry);
    deadline
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time;

    /// Spawn a CronService; return its command sender, shutdown token and
    /// the event receiver.
    fn spawn_test_cron() -> (mpsc::Sender<CronCommand>, CancellationToken, mpsc::Receiver<CronEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::channel(64);
        let shutdown = CancellationToken::new();
        let svc = CronService::new(cmd_rx, events_tx, shutdown.clone());
        tokio::spawn(svc.run());
        (cmd_tx, shutdown, events_rx)
    }

    async fn schedule(tx: &mpsc::Sender<CronCommand>, name: &str, spec: ScheduleSpec) -> String {
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(CronCommand::Schedule { name: name.into(), spec, reply: reply_tx }).await.unwrap();
        reply_rx.await.unwrap()
    }

    async fn list(tx: &mpsc::Sender<CronCommand>) -> Vec<CronEntryInfo> {
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(CronCommand::List { reply: reply_tx }).await.unwrap();
        reply_rx.await.unwrap()
    }

    #[tokio::test]
    async fn schedule_and_list() {
        let (tx, shutdown, _rx) = spawn_test_cron();
        let id = schedule(&tx, "quality_check", ScheduleSpec::Interval { every_secs: 3600 }).await;
        assert!(!id.is_empty());

        let entries = list(&tx).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].schedule_id, id);
        assert_eq!(entries[0].name, "quality_check");
        assert!(entries[0].due_in_secs <= 3600);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn cancel_success_and_miss() {
        let (tx, shutdown, _rx) = spawn_test_cron();
        let id = schedule(&tx, "x", ScheduleSpec::Interval { every_secs: 60 }).await;

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(CronCommand::Cancel { schedule_id: id, reply: reply_tx }).await.unwrap();
        assert!(reply_rx.await.unwrap());

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(CronCommand::Cancel { schedule_id: "bogus".into(), reply: reply_tx }).await.unwrap();
        assert!(!reply_rx.await.unwrap());

        assert!(list(&tx).await.is_empty());
        shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn interval_fires_repeatedly() {
        let (tx, shutdown, mut events) = spawn_test_cron();
        schedule(&tx, "tick", ScheduleSpec::Interval { every_secs: 1 }).await;

        time::advance(Duration::from_millis(1500)).await;
        let ev = time::timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
        assert_eq!(ev.name, "tick");

        time::advance(Duration::from_secs(1)).await;
        let ev = time::timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
        assert_eq!(ev.name, "tick");
        assert_eq!(list(&tx).await.len(), 1);

        shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn once_fires_and_is_removed() {
        let (tx, shutdown, mut events) = spawn_test_cron();
        schedule(&tx, "auto_dialog", ScheduleSpec::Once { delay_secs: 5 }).await;

        time::advance(Duration::from_secs(6)).await;
        let ev = time::timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
        assert_eq!(ev.name, "auto_dialog");
        assert!(list(&tx).await.is_empty());

        shutdown.cancel();
    }

    #[test]
    fn daily_is_within_a_day() {
        let d = until_daily(8, 0);
        assert!(d >= DAILY_MIN_LEAD);
        assert!(d <= DAY + DAILY_MIN_LEAD);
        assert_eq!(until_daily(25, 0), DAY);
    }

    #[test]
    fn one_shots_do_not_repeat() {
        let now = Instant::now();
        assert!(next_deadline_after(&ScheduleSpec::Once { delay_secs: 1 }, now).is_none());
        assert_eq!(
            next_deadline_after(&ScheduleSpec::Interval { every_secs: 10 }, now),
            Some(now + Duration::from_secs(10))
        );
    }
}
