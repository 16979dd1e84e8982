//! Memory subsystem — the growth log and the harvested dialog file.
//!
//! Both stores are plain UTF-8 files under the work directory:
//!
//! ```text
//! {work_dir}/
//! ├── growth_log.txt          — every exchange, delimiter-separated
//! └── companion_dialogs.md    — high-quality Q/A pairs
//! ```
//!
//! [`MemoryHandle`] is the async front: all file I/O is dispatched to the
//! blocking thread pool so callers can hold it across `.await`.

pub mod dialogs;
pub mod growth_log;
pub mod similarity;

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::MemoryConfig;
use crate::error::AppError;
use dialogs::DialogStore;
use growth_log::{GrowthLog, truncate_growth_log};

/// What a nightly compaction removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrganizeReport {
    pub dialog_lines_removed: usize,
    pub growth_segments_dropped: usize,
}

/// Async-safe handle to the companion's memory files.
///
/// Cheaply cloneable (`Arc`-backed).
#[derive(Clone)]
pub struct MemoryHandle {
    growth_log: Arc<GrowthLog>,
    dialogs: Arc<DialogStore>,
    max_context_chars: usize,
    keep_entries: usize,
    similarity_threshold: f32,
}

impl MemoryHandle {
    /// `speaker` labels the companion's lines in the growth log.
    pub fn new(config: &MemoryConfig, speaker: &str) -> Self {
        Self {
            growth_log: Arc::new(GrowthLog::new(config.growth_log_file.clone(), speaker)),
            dialogs: Arc::new(DialogStore::new(config.dialog_file.clone())),
            max_context_chars: config.growth_log_max_chars,
            keep_entries: config.growth_log_keep,
            similarity_threshold: config.similarity_threshold,
        }
    }

    async fn blocking<T, F>(&self, op: &'static str, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&GrowthLog, &DialogStore) -> Result<T, AppError> + Send + 'static,
    {
        let log = Arc::clone(&self.growth_log);
        let dialogs = Arc::clone(&self.dialogs);
        tokio::task::spawn_blocking(move || f(&log, &dialogs))
            .await
            .map_err(|e| AppError::Memory(format!("{op} join: {e}")))?
    }

    /// Growth-log text for one request: keyword-relevant entries plus the
    /// newest entry sharing `emotion_tag`, cut to the configured maximum.
    pub async fn growth_context(&self, message: &str, emotion_tag: &str) -> Result<String, AppError> {
        let message = message.to_string();
        let tag = emotion_tag.to_string();
        let max = self.max_context_chars;
        self.blocking("growth_context", move |log, _| {
            let mut context = log.recall_relevant(&message)?;
            let emotion_memory = log.recall_similar_emotion(&tag)?;
            if !emotion_memory.is_empty() {
                context.push('\n');
                context.push_str(&emotion_memory);
            }
            Ok(truncate_growth_log(&context, max))
        })
        .await
    }

    /// Log one exchange with its emotion tag.
    pub async fn record_exchange(
        &self,
        user: &str,
        reply: &str,
        style: &str,
        emotion_tag: &str,
    ) -> Result<(), AppError> {
        let (user, reply, style) = (user.to_string(), reply.to_string(), style.to_string());
        let extra = format!("情感标签: {emotion_tag}");
        self.blocking("record_exchange", move |log, _| log.append(&user, &reply, &style, &extra))
            .await
    }

    /// Store a high-quality pair unless a near-duplicate is already on file.
    /// Returns `true` when the pair was written.
    pub async fn harvest(&self, question: &str, answer: &str) -> Result<bool, AppError> {
        let (question, answer) = (question.to_string(), answer.to_string());
        let threshold = self.similarity_threshold;
        self.blocking("harvest", move |_, dialogs| {
            let existing = dialogs.load_qas()?;
            let candidate = format!("Q: {question}\nA: {answer}");
            if similarity::is_similar(&candidate, &existing, threshold) {
                debug!(existing = existing.len(), "similar dialog already stored, skipping");
                return Ok(false);
            }
            dialogs.append(&question, &answer)?;
            Ok(true)
        })
        .await
    }

    /// Mark a harvested pair in the growth log.
    pub async fn record_high_quality(
        &self,
        user: &str,
        reply: &str,
        style: &str,
        emotion_tag: &str,
    ) -> Result<(), AppError> {
        let (user, reply, style, tag) =
            (user.to_string(), reply.to_string(), style.to_string(), emotion_tag.to_string());
        self.blocking("record_high_quality", move |log, _| {
            log.append_high_quality(&user, &reply, &style, &tag)
        })
        .await
    }

    /// The last `n` lines of the dialog file.
    pub async fn recent_dialog_lines(&self, n: usize) -> Result<Vec<String>, AppError> {
        self.blocking("recent_dialog_lines", move |_, dialogs| dialogs.recent_lines(n)).await
    }

    /// Deduplicate the dialog file and trim the growth log to its newest entries.
    pub async fn organize(&self) -> Result<OrganizeReport, AppError> {
        let keep = self.keep_entries;
        let report = self
            .blocking("organize", move |log, dialogs| {
                Ok(OrganizeReport {
                    dialog_lines_removed: dialogs.dedup_lines()?,
                    growth_segments_dropped: log.keep_recent(keep)?,
                })
            })
            .await?;
        info!(
            dialog_lines_removed = report.dialog_lines_removed,
            growth_segments_dropped = report.growth_segments_dropped,
            "memory organized"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn handle(dir: &TempDir) -> MemoryHandle {
        let cfg = Config::test_default(dir.path());
        MemoryHandle::new(&cfg.memory, "小悠")
    }

    #[tokio::test]
    async fn context_combines_relevant_and_emotion_recall() {
        let dir = TempDir::new().unwrap();
        let mem = handle(&dir);
        mem.record_exchange("今天 好开心", "真好呀", "温柔型", "情感-开心").await.unwrap();
        mem.record_exchange("晚饭", "吃了吗", "温柔型", "日常-关心").await.unwrap();
        let ctx = mem.growth_context("晚饭", "情感-开心").await.unwrap();
        assert!(ctx.chars().count() <= 500);
        assert!(ctx.contains("【情感回忆】"));
        assert!(ctx.contains("真好呀"));
    }

    #[tokio::test]
    async fn empty_memory_gives_empty_context() {
        let dir = TempDir::new().unwrap();
        let ctx = handle(&dir).growth_context("你好", "其他").await.unwrap();
        assert_eq!(ctx, "");
    }

    #[tokio::test]
    async fn harvest_skips_duplicates() {
        let dir = TempDir::new().unwrap();
        let mem = handle(&dir);
        assert!(mem.harvest("想你", "我也想你呀，抱抱~").await.unwrap());
        assert!(!mem.harvest("想你", "我也想你呀，抱抱~").await.unwrap());
        assert!(mem.harvest("今晚吃什么", "我们一起去吃火锅吧！").await.unwrap());
        let lines = mem.recent_dialog_lines(100).await.unwrap();
        assert_eq!(lines.iter().filter(|l| l.starts_with("Q:")).count(), 2);
    }

    #[tokio::test]
    async fn organize_compacts_both_files() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::test_default(dir.path());
        cfg.memory.growth_log_keep = 2;
        let mem = MemoryHandle::new(&cfg.memory, "小悠");
        for i in 0..4 {
            mem.record_exchange(&format!("m{i}"), "r", "温柔型", "其他").await.unwrap();
        }
        std::fs::write(&cfg.memory.dialog_file, "Q: a\nA: b\n\nQ: a\nA: b\n\n").unwrap();
        let report = mem.organize().await.unwrap();
        assert_eq!(report.dialog_lines_removed, 3);
        assert_eq!(report.growth_segments_dropped, 3);
    }
}
