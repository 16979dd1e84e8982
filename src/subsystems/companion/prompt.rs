//! Layered system-prompt builder.
//!
//! The companion's system prompt is assembled from in-memory fragments
//! (scenario template, style, persona, mood hints) plus plain-text template
//! files under `config/prompts/`. Missing files fall back to inline text.
//!
//! ## Layer ordering
//!
//! ```text
//! 0. scenario template   — what kind of conversation this is
//! 1. 【风格要求】          — style prompt
//! 2. persona line        — name, personality, interests, background
//! 3. emotional hints     — from EmotionalState
//! 4. behavior hints      — from BehaviorPatterns
//! 5. companion.md        — fixed companion guidance; {{style_type}} placeholder
//! ```
//!
//! Variable substitution uses `{{key}}` syntax and is applied once at
//! [`build()`](PromptBuilder::build) time, after all layers are joined.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

const SEPARATOR: &str = "\n\n";

const GUIDANCE_FALLBACK: &str = "【回复要求】
1. 保持对话的自然流畅，避免机械和模板化
2. 根据情感状态调整回复风格和语气
3. 记住用户说过的话，在合适的时候提及
4. 参考成长日志中的对话模式，但不要完全照搬
5. 适当使用表情符号增加情感表达

请以{{style_type}}的方式与用户交流，展现出你的个性和情感。";

/// Fluent builder that assembles a layered prompt.
pub struct PromptBuilder {
    prompts_dir: PathBuf,
    parts: Vec<String>,
    vars: HashMap<String, String>,
}

impl PromptBuilder {
    /// Create a builder rooted at `prompts_dir` (e.g. `"config/prompts"`).
    pub fn new(prompts_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompts_dir: prompts_dir.into(),
            parts: Vec::new(),
            vars: HashMap::new(),
        }
    }

    /// Append a layer loaded from `filename`, or `fallback` when the file
    /// is missing or empty.
    pub fn layer_or(mut self, filename: &str, fallback: &str) -> Self {
        let path = self.prompts_dir.join(filename);
        let text = match fs::read_to_string(&path) {
            Ok(text) if !text.trim().is_empty() => text,
            _ => {
                tracing::debug!("prompt: layer '{}' not found, using inline text", path.display());
                fallback.to_string()
            }
        };
        self.append(text)
    }

    /// Directly append a text fragment. Blank fragments are skipped.
    pub fn append(mut self, text: impl Into<String>) -> Self {
        let s = text.into();
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            self.parts.push(trimmed.to_string());
        }
        self
    }

    /// Register a single `{{key}}` → `value` substitution.
    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Assemble all layers, join with blank lines, and apply variable substitution.
    pub fn build(self) -> String {
        let mut prompt = self.parts.join(SEPARATOR);
        for (k, v) in &self.vars {
            let placeholder = format!("{{{{{}}}}}", k);
            prompt = prompt.replace(&placeholder, v);
        }
        prompt
    }
}

/// Persona line describing who the companion is.
pub fn persona(name: &str, personality: &str, interests: &[String], background: &str) -> String {
    format!(
        "你是一个名为{name}的虚拟伴侣，性格{personality}，兴趣{}，背景：{background}。",
        interests.join(",")
    )
}

/// Standard guidance layer (`companion.md`) with its inline fallback.
pub fn guidance(builder: PromptBuilder, style_type: &str) -> PromptBuilder {
    builder.layer_or("companion.md", GUIDANCE_FALLBACK).var("style_type", style_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn blank_parts_skipped_and_joined() {
        let p = PromptBuilder::new("/nonexistent").append("a").append("  ").append("b").build();
        assert_eq!(p, "a\n\nb");
    }

    #[test]
    fn vars_substituted() {
        let p = PromptBuilder::new("/nonexistent")
            .append("style: {{style_type}}")
            .var("style_type", "撒娇型")
            .build();
        assert_eq!(p, "style: 撒娇型");
    }

    #[test]
    fn missing_layer_uses_fallback() {
        let p = guidance(PromptBuilder::new("/nonexistent"), "温柔型").build();
        assert!(p.contains("请以温柔型的方式"));
        assert!(!p.contains("{{"));
    }

    #[test]
    fn layer_file_preferred() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("companion.md"), "自定义指引 {{style_type}}\n").unwrap();
        let p = guidance(PromptBuilder::new(dir.path()), "可爱型").build();
        assert_eq!(p, "自定义指引 可爱型");
    }

    #[test]
    fn persona_line() {
        let line = persona("小悠", "温柔", &["看电影".into(), "旅行".into()], "大学生");
        assert_eq!(line, "你是一个名为小悠的虚拟伴侣，性格温柔，兴趣看电影,旅行，背景：大学生。");
    }
}
