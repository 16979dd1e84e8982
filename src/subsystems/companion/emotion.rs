//! Keyword-based emotion tagging and the companion's emotional state.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Tag returned when no keyword matches.
pub const OTHER_TAG: &str = "其他";

/// Ordered keyword → tag table. Order matters: among the matched tags the
/// first interaction/emotion tag wins, then the first tag of any kind.
const EMOTION_TAGS: &[(&str, &str)] = &[
    // basic emotions
    ("开心", "情感-开心"),
    ("高兴", "情感-开心"),
    ("想你", "互动-思念"),
    ("思念", "情感-思念"),
    ("生气", "情感-负面"),
    ("不理你", "情感-负面"),
    ("委屈", "情感-负面"),
    // intimacy
    ("撒娇", "互动-亲昵"),
    ("抱抱", "互动-亲昵"),
    ("亲亲", "互动-亲昵"),
    ("爱你", "互动-爱意"),
    ("喜欢", "互动-爱意"),
    // daily care
    ("吃饭", "日常-关心"),
    ("睡觉", "日常-关心"),
    ("工作", "日常-关心"),
    ("学习", "日常-关心"),
    ("累", "日常-关心"),
    ("困", "日常-关心"),
    // romance
    ("浪漫", "情感-浪漫"),
    ("甜蜜", "情感-浪漫"),
    ("温暖", "情感-浪漫"),
    ("幸福", "情感-浪漫"),
    // support
    ("难过", "情感-支持"),
    ("伤心", "情感-支持"),
    ("压力", "情感-支持"),
    ("焦虑", "情感-支持"),
];

/// Classify `text` into a single emotion tag for memory recall.
pub fn extract_emotion_tag(text: &str) -> &'static str {
    let mut detected = EMOTION_TAGS
        .iter()
        .filter(|(keyword, _)| text.contains(keyword))
        .map(|(_, tag)| *tag)
        .peekable();

    let Some(&first) = detected.peek() else {
        return OTHER_TAG;
    };
    detected
        .find(|tag| tag.contains("互动") || tag.contains("情感"))
        .unwrap_or(first)
}

/// Coarse tag attached to knowledge-base uploads.
pub fn auto_tag(text: &str) -> &'static str {
    if text.contains("开心") || text.contains("高兴") {
        "情感-开心"
    } else if text.contains("想你") || text.contains("思念") {
        "情感-思念"
    } else if text.contains("吃什么") || text.contains("做什么") {
        "日常"
    } else {
        OTHER_TAG
    }
}

const POSITIVE_WORDS: &[&str] = &[
    "喜欢", "开心", "好", "棒", "爱", "谢谢", "想", "抱", "亲", "甜", "暖", "美", "帅", "可爱",
    "温柔", "体贴",
];

const NEGATIVE_WORDS: &[&str] = &[
    "讨厌", "难过", "不好", "糟糕", "生气", "烦", "累", "困", "饿", "冷", "热", "痛", "苦", "难",
];

/// Six-axis emotional state, every axis within `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalState {
    pub happiness: f32,
    pub affection: f32,
    pub energy: f32,
    pub trust: f32,
    pub curiosity: f32,
    pub empathy: f32,
}

impl Default for EmotionalState {
    fn default() -> Self {
        Self {
            happiness: 0.5,
            affection: 0.5,
            energy: 0.5,
            trust: 0.5,
            curiosity: 0.5,
            empathy: 0.5,
        }
    }
}

impl EmotionalState {
    /// Nudge happiness, affection and energy by the sentiment of a user message.
    pub fn update_from_message(&mut self, message: &str) {
        let positive = POSITIVE_WORDS.iter().filter(|w| message.contains(*w)).count();
        let negative = NEGATIVE_WORDS.iter().filter(|w| message.contains(*w)).count();

        let sign = match positive.cmp(&negative) {
            std::cmp::Ordering::Greater => 1.0,
            std::cmp::Ordering::Less => -1.0,
            std::cmp::Ordering::Equal => return,
        };
        self.happiness = (self.happiness + sign * 0.05).clamp(0.0, 1.0);
        self.affection = (self.affection + sign * 0.03).clamp(0.0, 1.0);
        self.energy = (self.energy + sign * 0.02).clamp(0.0, 1.0);
    }

    /// Mood used to decorate replies, if any axis is high enough.
    pub fn mood(&self) -> Option<Mood> {
        if self.happiness > 0.7 {
            Some(Mood::Happy)
        } else if self.affection > 0.7 {
            Some(Mood::Love)
        } else {
            None
        }
    }

    /// Tone hints injected into the system prompt.
    pub fn prompt(&self) -> String {
        let mut lines = Vec::new();
        if self.happiness > 0.7 {
            lines.push("你现在心情很好，可以表现得更加活泼和积极。");
        } else if self.happiness < 0.3 {
            lines.push("你现在心情有些低落，语气可以稍微温柔一些。");
        }
        if self.affection > 0.7 {
            lines.push("你和用户的关系很亲密，可以适当撒娇或表达思念。");
        } else if self.affection < 0.3 {
            lines.push("你和用户的关系还需要培养，保持适度的距离感。");
        }
        if self.energy > 0.7 {
            lines.push("你现在充满活力，可以表现得更加热情。");
        } else if self.energy < 0.3 {
            lines.push("你现在比较疲惫，语气可以更加温柔。");
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mood {
    Happy,
    Love,
}

impl Mood {
    pub fn emojis(self) -> &'static [&'static str] {
        match self {
            Mood::Happy => &["😊", "😄", "😃", "😁", "😆"],
            Mood::Love => &["❤️", "💕", "💖", "💗", "💓"],
        }
    }
}

/// Append one or two distinct emojis of `mood` to the end of `text`.
pub fn decorate(text: &str, mood: Mood) -> String {
    let mut rng = rand::thread_rng();
    let count = rng.gen_range(1..=2);
    let picked: Vec<&str> = mood.emojis().choose_multiple(&mut rng, count).copied().collect();
    format!("{text} {}", picked.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_keyword_tags_happy() {
        assert_eq!(extract_emotion_tag("开心"), "情感-开心");
        assert_eq!(extract_emotion_tag("今天好高兴"), "情感-开心");
    }

    #[test]
    fn no_keyword_is_other() {
        assert_eq!(extract_emotion_tag("天气预报说明天下雨"), OTHER_TAG);
        assert_eq!(extract_emotion_tag(""), OTHER_TAG);
    }

    #[test]
    fn emotion_category_beats_daily_care() {
        // 累 (daily care) precedes 难过 in the text, but emotion tags win.
        assert_eq!(extract_emotion_tag("好累啊，有点难过"), "情感-支持");
        assert_eq!(extract_emotion_tag("工作好累"), "日常-关心");
    }

    #[test]
    fn table_order_decides_between_preferred_tags() {
        // 开心 comes before 抱抱 in the table.
        assert_eq!(extract_emotion_tag("抱抱我，我很开心"), "情感-开心");
        assert_eq!(extract_emotion_tag("我想你了"), "互动-思念");
    }

    #[test]
    fn auto_tag_buckets() {
        assert_eq!(auto_tag("我好开心"), "情感-开心");
        assert_eq!(auto_tag("好思念你"), "情感-思念");
        assert_eq!(auto_tag("晚上吃什么"), "日常");
        assert_eq!(auto_tag("嗯"), OTHER_TAG);
    }

    #[test]
    fn positive_message_raises_state() {
        let mut s = EmotionalState::default();
        s.update_from_message("谢谢你，好喜欢");
        assert!((s.happiness - 0.55).abs() < 1e-6);
        assert!((s.affection - 0.53).abs() < 1e-6);
        assert!((s.energy - 0.52).abs() < 1e-6);
        assert_eq!(s.trust, 0.5);
    }

    #[test]
    fn negative_message_lowers_state() {
        let mut s = EmotionalState::default();
        s.update_from_message("好烦，讨厌");
        assert!(s.happiness < 0.5);
        assert!(s.affection < 0.5);
    }

    #[test]
    fn balanced_message_leaves_state() {
        let mut s = EmotionalState::default();
        s.update_from_message("喜欢但是累");
        assert_eq!(s, EmotionalState::default());
    }

    #[test]
    fn state_stays_clamped() {
        let mut s = EmotionalState::default();
        for _ in 0..50 {
            s.update_from_message("开心");
        }
        assert_eq!(s.happiness, 1.0);
        for _ in 0..100 {
            s.update_from_message("讨厌");
        }
        assert_eq!(s.happiness, 0.0);
        assert_eq!(s.energy, 0.0);
    }

    #[test]
    fn mood_prefers_happiness() {
        let mut s = EmotionalState::default();
        assert_eq!(s.mood(), None);
        s.affection = 0.8;
        assert_eq!(s.mood(), Some(Mood::Love));
        s.happiness = 0.8;
        assert_eq!(s.mood(), Some(Mood::Happy));
    }

    #[test]
    fn decorate_appends_distinct_emojis() {
        for _ in 0..20 {
            let out = decorate("你好", Mood::Love);
            let tail: Vec<&str> = out.strip_prefix("你好 ").unwrap().split(' ').collect();
            assert!((1..=2).contains(&tail.len()));
            assert!(tail.iter().all(|e| Mood::Love.emojis().contains(e)));
            if tail.len() == 2 {
                assert_ne!(tail[0], tail[1]);
            }
        }
    }
}
