//! Tests for the shipped prompt templates and default config under config/

use std::fs;

use companion_bot::config;
use companion_bot::subsystems::companion::prompt::{PromptBuilder, guidance};

#[test]
fn test_companion_prompt_file_exists() {
    let path = "config/prompts/companion.md";
    assert!(fs::metadata(path).is_ok(), "companion.md prompt file missing");
}

#[test]
fn test_companion_prompt_template_vars() {
    let text = fs::read_to_string("config/prompts/companion.md").unwrap();
    assert!(text.contains("{{style_type}}"), "companion.md should contain {{style_type}} variable");
}

#[test]
fn test_guidance_layer_substitutes_style() {
    let prompt = guidance(PromptBuilder::new("config/prompts"), "撒娇型").build();
    assert!(prompt.contains("请以撒娇型的方式与用户交流"));
    assert!(!prompt.contains("{{"));
}

#[test]
fn test_default_config_parses() {
    let cfg = config::load_from(std::path::Path::new("config/default.toml"), Some("/tmp/companion-test"), None)
        .unwrap();
    assert_eq!(cfg.llm.provider, "dummy");
    assert_eq!(cfg.companion.style_type, "温柔型");
    assert_eq!(cfg.cron.morning_at, (8, 0));
    assert_eq!(cfg.memory.growth_log_file, std::path::PathBuf::from("/tmp/companion-test/growth_log.txt"));
}
