//! `growth_log.txt` — append-only plain-text log of past exchanges.
//!
//! Entries are separated by a line of 40 dashes:
//!
//! ```text
//! 时间: 2026-02-19 21:04:11
//! 用户: 今天好累
//! 小悠: 抱抱你，早点休息哦
//! 风格: 温柔型
//! 情感标签: 日常-关心
//! ----------------------------------------
//! ```
//!
//! The file is read and rewritten wholesale; there is no index.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::subsystems::companion::emotion::OTHER_TAG;

/// Entry delimiter: 40 ASCII dashes.
pub const DELIMITER: &str = "----------------------------------------";

/// Maximum number of entries returned by keyword recall.
const MAX_RECALLED: usize = 2;

pub struct GrowthLog {
    path: PathBuf,
    speaker: String,
}

impl GrowthLog {
    /// `speaker` is the label used for the companion's lines (its name).
    pub fn new(path: PathBuf, speaker: impl Into<String>) -> Self {
        Self { path, speaker: speaker.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whole log text; empty when the file does not exist yet.
    pub fn read_all(&self) -> Result<String, AppError> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(AppError::Memory(format!(
                "cannot read {}: {e}",
                self.path.display()
            ))),
        }
    }

    /// Append one exchange. `extra` holds trailing free-form lines.
    pub fn append(&self, user: &str, reply: &str, style: &str, extra: &str) -> Result<(), AppError> {
        let entry = format!(
            "时间: {}\n用户: {user}\n{}: {reply}\n风格: {style}\n{extra}\n{DELIMITER}\n",
            now_local(),
            self.speaker,
        );
        self.append_raw(&entry)
    }

    /// Append an exchange marked as a harvested high-quality dialogue.
    pub fn append_high_quality(
        &self,
        user: &str,
        reply: &str,
        style: &str,
        emotion_tag: &str,
    ) -> Result<(), AppError> {
        self.append(user, reply, style, &format!("标签: 高质量对话\n情感标签: {emotion_tag}"))
    }

    fn append_raw(&self, entry: &str) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AppError::Memory(format!("cannot open {}: {e}", self.path.display())))?;
        f.write_all(entry.as_bytes())
            .map_err(|e| AppError::Memory(format!("cannot write {}: {e}", self.path.display())))
    }

    /// Up to two entries sharing keywords with `message`, best first.
    pub fn recall_relevant(&self, message: &str) -> Result<String, AppError> {
        Ok(recall_relevant_in(&self.read_all()?, message))
    }

    /// Newest entry carrying `tag`, prefixed with `【情感回忆】`.
    pub fn recall_similar_emotion(&self, tag: &str) -> Result<String, AppError> {
        if tag == OTHER_TAG {
            return Ok(String::new());
        }
        let content = self.read_all()?;
        Ok(content
            .split(DELIMITER)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .find(|entry| entry.contains(tag))
            .map(|entry| format!("【情感回忆】\n{}", entry.trim()))
            .unwrap_or_default())
    }

    /// Rewrite the log keeping only the last `n` delimiter-separated segments.
    /// Returns the number of segments dropped.
    pub fn keep_recent(&self, n: usize) -> Result<usize, AppError> {
        let content = self.read_all()?;
        if content.is_empty() {
            return Ok(0);
        }
        let segments: Vec<&str> = content.split(DELIMITER).collect();
        let dropped = segments.len().saturating_sub(n);
        if dropped == 0 {
            return Ok(0);
        }
        let kept = segments[dropped..].join(DELIMITER);
        fs::write(&self.path, kept)
            .map_err(|e| AppError::Memory(format!("cannot write {}: {e}", self.path.display())))?;
        Ok(dropped)
    }
}

/// Last segment holding any text; empty when there is none.
fn last_entry(content: &str) -> &str {
    content
        .split(DELIMITER)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .find(|s| !s.trim().is_empty())
        .unwrap_or("")
}

/// Keyword recall over raw log text.
///
/// Keywords are the whitespace-separated lowercase tokens of `message`; an
/// entry scores one point per keyword it contains. Falls back to the newest
/// entry when `message` is empty or nothing matches.
pub fn recall_relevant_in(content: &str, message: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    let lowered = message.to_lowercase();
    let mut keywords: Vec<&str> = lowered.split_whitespace().collect();
    keywords.sort_unstable();
    keywords.dedup();
    if keywords.is_empty() {
        return last_entry(content).to_string();
    }

    let mut scored: Vec<(&str, usize)> = content
        .split(DELIMITER)
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            let entry_lower = entry.to_lowercase();
            let score = keywords.iter().filter(|k| entry_lower.contains(**k)).count();
            (score > 0).then_some((entry, score))
        })
        .collect();

    if scored.is_empty() {
        return last_entry(content).to_string();
    }
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored
        .into_iter()
        .take(MAX_RECALLED)
        .map(|(entry, _)| entry)
        .collect::<Vec<_>>()
        .join(DELIMITER)
}

/// Cut `log` down to at most `max_chars` characters, keeping the newest
/// segments whole. Segments are concatenated without their delimiters.
pub fn truncate_growth_log(log: &str, max_chars: usize) -> String {
    if log.chars().count() <= max_chars {
        return log.to_string();
    }
    let mut kept: Vec<&str> = Vec::new();
    let mut total = 0usize;
    for entry in log.split(DELIMITER).collect::<Vec<_>>().into_iter().rev() {
        let len = entry.chars().count();
        if total + len > max_chars {
            break;
        }
        total += len;
        kept.push(entry);
    }
    kept.reverse();
    kept.concat()
}

fn now_local() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log_in(dir: &TempDir) -> GrowthLog {
        GrowthLog::new(dir.path().join("growth_log.txt"), "小悠")
    }

    #[test]
    fn read_all_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert_eq!(log_in(&dir).read_all().unwrap(), "");
    }

    #[test]
    fn append_writes_entry_format() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        log.append("今天好累", "抱抱你", "温柔型", "情感标签: 日常-关心").unwrap();
        let text = log.read_all().unwrap();
        assert!(text.starts_with("时间: "));
        assert!(text.contains("\n用户: 今天好累\n小悠: 抱抱你\n风格: 温柔型\n情感标签: 日常-关心\n"));
        assert!(text.ends_with(&format!("{DELIMITER}\n")));
    }

    #[test]
    fn high_quality_entry_is_labelled() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        log.append_high_quality("想你", "我也想你呀~", "撒娇型", "互动-思念").unwrap();
        let text = log.read_all().unwrap();
        assert!(text.contains("标签: 高质量对话\n情感标签: 互动-思念"));
    }

    #[test]
    fn recall_returns_at_most_two_best_first() {
        let content = [
            "\n用户: 猫 狗\n",
            "\n用户: 猫 狗 鱼\n",
            "\n用户: 猫\n",
            "\n用户: 鸟\n",
        ]
        .join(DELIMITER);
        let out = recall_relevant_in(&content, "猫 狗 鱼");
        let parts: Vec<&str> = out.split(DELIMITER).collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].contains("猫 狗 鱼"));
        assert!(parts[1].contains("猫 狗\n"));
    }

    #[test]
    fn recall_is_case_insensitive() {
        let content = format!("\n用户: I love Rust\n{DELIMITER}\n用户: other\n{DELIMITER}\n");
        assert!(recall_relevant_in(&content, "RUST").contains("I love Rust"));
    }

    #[test]
    fn recall_without_match_returns_newest() {
        let content = format!("\nA\n{DELIMITER}\nB\n{DELIMITER}\n");
        assert_eq!(recall_relevant_in(&content, "xyz").trim(), "B");
        assert_eq!(recall_relevant_in(&content, "").trim(), "B");
        assert_eq!(recall_relevant_in("", "xyz"), "");
    }

    #[test]
    fn similar_emotion_recall_picks_newest() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        log.append("a", "first", "温柔型", "情感标签: 情感-开心").unwrap();
        log.append("b", "second", "温柔型", "情感标签: 情感-开心").unwrap();
        log.append("c", "third", "温柔型", "情感标签: 日常-关心").unwrap();
        let out = log.recall_similar_emotion("情感-开心").unwrap();
        assert!(out.starts_with("【情感回忆】\n时间: "));
        assert!(out.contains("second"));
        assert!(!out.contains("first"));
        assert_eq!(log.recall_similar_emotion(OTHER_TAG).unwrap(), "");
        assert_eq!(log.recall_similar_emotion("情感-浪漫").unwrap(), "");
    }

    #[test]
    fn truncate_within_limit_unchanged() {
        assert_eq!(truncate_growth_log("short", 500), "short");
    }

    #[test]
    fn truncate_keeps_newest_and_respects_limit() {
        let entries: Vec<String> = (0..10).map(|i| format!("\n条目{i}号{}\n", "字".repeat(40))).collect();
        let log = entries.join(DELIMITER);
        let out = truncate_growth_log(&log, 120);
        assert!(out.chars().count() <= 120);
        assert!(out.contains("条目9号"));
        assert!(out.contains("条目8号"));
        assert!(!out.contains("条目0号"));
    }

    #[test]
    fn truncate_oversized_newest_yields_empty() {
        let log = format!("a{DELIMITER}{}", "x".repeat(50));
        assert_eq!(truncate_growth_log(&log, 10), "");
    }

    #[test]
    fn keep_recent_drops_oldest_segments() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        for i in 0..5 {
            log.append(&format!("msg{i}"), "r", "温柔型", "").unwrap();
        }
        // 5 entries + trailing segment = 6 segments
        assert_eq!(log.keep_recent(3).unwrap(), 3);
        let text = log.read_all().unwrap();
        assert!(!text.contains("msg2"));
        assert!(text.contains("msg3"));
        assert!(text.contains("msg4"));
        assert_eq!(log.keep_recent(100).unwrap(), 0);
    }
}
