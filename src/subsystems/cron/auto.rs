//! Auto companion — cron-driven greetings, care messages and data upkeep.
//!
//! Registers its schedules with the cron service and reacts to the fired
//! events. Messages it "sends" run through the normal companion pipeline;
//! the replies are broadcast to any attached console.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::CronConfig;
use crate::error::AppError;
use crate::subsystems::comms::CommsState;
use crate::subsystems::companion::quality::is_high_quality_reply;

use super::{CronEvent, CronHandle, ScheduleSpec};

pub const MORNING_GREETING: &str = "morning_greeting";
pub const GOOD_NIGHT: &str = "good_night";
pub const QUALITY_CHECK: &str = "quality_check";
pub const ORGANIZE_DATA: &str = "organize_data";
pub const INACTIVITY_CHECK: &str = "inactivity_check";
pub const AUTO_DIALOG: &str = "auto_dialog";

const MORNING_TEXT: &str = "早安呀~新的一天开始啦，希望你今天也能开开心心的！";
const NIGHT_TEXT: &str = "晚安啦~今天也要好好休息哦，明天见！";

const CARE_MESSAGES: &[&str] = &[
    "在忙什么呢？要注意休息哦~",
    "想你了，在做什么呢？",
    "工作累了吗？要记得喝水哦~",
    "有没有想我呀？",
    "要注意身体哦，不要太累了~",
];

const AUTO_MESSAGES: &[&str] = &[
    "今天过得怎么样呀？",
    "有没有想我呀？",
    "工作累不累呀？要记得休息哦~",
    "在忙什么呢？",
    "要注意身体哦~",
    "想和你聊聊天~",
    "今天天气真好呢~",
    "有没有好好吃饭呀？",
    "要记得多喝水哦~",
    "想听听你的声音~",
];

/// Dialog-file lines inspected by the quality check.
const QUALITY_WINDOW_LINES: usize = 20;
/// Fewer high-quality lines than this in the window rotates the style.
const QUALITY_MIN_GOOD_LINES: usize = 10;

fn pick(messages: &'static [&'static str]) -> &'static str {
    messages.choose(&mut rand::thread_rng()).copied().unwrap_or_default()
}

fn random_delay_secs(min: u64, max: u64) -> u64 {
    if min >= max { min } else { rand::thread_rng().gen_range(min..=max) }
}

pub struct AutoCompanion {
    state: Arc<CommsState>,
    cron: CronHandle,
    config: CronConfig,
}

impl AutoCompanion {
    pub fn new(state: Arc<CommsState>, cron: CronHandle, config: CronConfig) -> Self {
        Self { state, cron, config }
    }

    /// Register every schedule with the cron service.
    pub async fn register(&self) -> Result<(), AppError> {
        let c = &self.config;
        let daily = |(hour, minute): (u32, u32)| ScheduleSpec::Daily { hour, minute };
        self.cron.schedule(MORNING_GREETING, daily(c.morning_at)).await?;
        self.cron.schedule(GOOD_NIGHT, daily(c.night_at)).await?;
        self.cron.schedule(ORGANIZE_DATA, daily(c.organize_at)).await?;
        self.cron
            .schedule(QUALITY_CHECK, ScheduleSpec::Interval { every_secs: c.quality_check_every_secs })
            .await?;
        self.cron
            .schedule(INACTIVITY_CHECK, ScheduleSpec::Interval { every_secs: c.inactivity_check_every_secs })
            .await?;
        self.schedule_auto_dialog().await?;
        info!("auto companion schedules registered");
        Ok(())
    }

    async fn schedule_auto_dialog(&self) -> Result<(), AppError> {
        let delay_secs = random_delay_secs(self.config.auto_dialog_min_secs, self.config.auto_dialog_max_secs);
        self.cron.schedule(AUTO_DIALOG, ScheduleSpec::Once { delay_secs }).await?;
        debug!(delay_secs, "next auto dialog scheduled");
        Ok(())
    }

    /// React to one fired event.
    pub async fn handle(&self, name: &str) -> Result<(), AppError> {
        match name {
            MORNING_GREETING => {
                self.state.auto_message(MORNING_TEXT).await?;
                info!("morning greeting sent");
            }
            GOOD_NIGHT => {
                self.state.auto_message(NIGHT_TEXT).await?;
                info!("good night sent");
            }
            QUALITY_CHECK => {
                self.quality_check().await?;
            }
            ORGANIZE_DATA => {
                self.state.memory().organize().await?;
            }
            INACTIVITY_CHECK => {
                self.inactivity_check().await?;
            }
            AUTO_DIALOG => {
                let sent = self.state.auto_message(pick(AUTO_MESSAGES)).await;
                // Reschedule even when the message failed.
                self.schedule_auto_dialog().await?;
                sent?;
            }
            other => warn!(event = other, "auto companion: unknown event"),
        }
        Ok(())
    }

    /// Count high-quality lines among the newest dialog lines; rotate the
    /// style when there are too few. Returns the count.
    pub async fn quality_check(&self) -> Result<usize, AppError> {
        let lines = self.state.memory().recent_dialog_lines(QUALITY_WINDOW_LINES).await?;
        let score = lines.iter().filter(|l| is_high_quality_reply(l)).count();
        debug!(score, lines = lines.len(), "conversation quality checked");
        if score < QUALITY_MIN_GOOD_LINES {
            match self.state.rotate_style().await {
                Some(style) => info!(score, %style, "low reply quality, style adjusted"),
                None => debug!("no companion yet, style unchanged"),
            }
        }
        Ok(score)
    }

    /// Send a care message after a long silence. Returns whether one was sent.
    pub async fn inactivity_check(&self) -> Result<bool, AppError> {
        let threshold = Duration::from_secs(self.config.inactivity_threshold_secs);
        if self.state.idle_for() <= threshold {
            return Ok(false);
        }
        self.state.auto_message(pick(CARE_MESSAGES)).await?;
        info!("care message sent after inactivity");
        Ok(true)
    }

    /// Dispatch cron events until shutdown or until the cron service exits.
    pub async fn run(self, mut events: mpsc::Receiver<CronEvent>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                ev = events.recv() => {
                    let Some(ev) = ev else { break };
                    if let Err(e) = self.handle(&ev.name).await {
                        error!(event = %ev.name, "auto companion task failed: {e}");
                    }
                }
            }
        }
        info!("auto companion stopped");
    }
}
