//! Speaking-style prompts.

/// Fallback style key for unknown style types.
pub const DEFAULT_STYLE: &str = "默认";

const STYLE_PROMPTS: &[(&str, &str)] = &[
    (
        "撒娇型",
        "请用撒娇、可爱、亲昵的语气和用户对话，适当使用[亲亲][抱抱][比心]等表情符号，喜欢用昵称称呼用户，经常表达依赖和想念。",
    ),
    (
        "高冷御姐型",
        "请用高冷、成熟、理性、略有距离感的语气和用户对话，话语简洁但有分寸，偶尔流露关心和温柔。",
    ),
    ("温柔型", "请用温柔、体贴、情绪稳定的语气和用户对话，善于安慰和包容，表达理解和支持。"),
    ("可爱型", "请用童趣、萌感十足、活泼可爱的语气和用户对话，喜欢撒娇卖萌，表达依赖和喜欢。"),
    ("日常型", "请用自然、随和、生活化的语气和用户对话，像真实情侣一样互动，充满生活气息。"),
    (DEFAULT_STYLE, "请用自然、亲昵、生活化的情侣语气和用户对话，像真实情侣一样互动。"),
];

/// Styles cycled through when reply quality drops.
const ROTATION: &[&str] = &["温柔型", "撒娇型", "可爱型", "日常型"];

/// Prompt text for `style_type`; unknown types get the default style.
pub fn style_prompt(style_type: &str) -> &'static str {
    STYLE_PROMPTS
        .iter()
        .find(|(name, _)| *name == style_type)
        .or_else(|| STYLE_PROMPTS.iter().find(|(name, _)| *name == DEFAULT_STYLE))
        .map(|(_, prompt)| *prompt)
        .unwrap_or_default()
}

/// Selectable style names with a one-line description, for the console menu.
pub fn catalogue() -> &'static [(&'static str, &'static str)] {
    &[
        ("撒娇型", "可爱亲昵，喜欢撒娇"),
        ("高冷御姐型", "成熟理性，略有距离感"),
        ("温柔型", "体贴包容，善解人意"),
        ("可爱型", "活泼可爱，充满活力"),
        ("日常型", "自然随和，生活化"),
    ]
}

/// Next style in the rotation. Styles outside the rotation restart it.
pub fn next_style(current: &str) -> &'static str {
    match ROTATION.iter().position(|s| *s == current) {
        Some(i) => ROTATION[(i + 1) % ROTATION.len()],
        None => ROTATION[0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_style_prompt() {
        assert!(style_prompt("撒娇型").contains("撒娇"));
        assert!(style_prompt("高冷御姐型").contains("高冷"));
    }

    #[test]
    fn unknown_style_falls_back_to_default() {
        assert_eq!(style_prompt("不存在的风格"), style_prompt(DEFAULT_STYLE));
        assert_eq!(style_prompt(""), style_prompt(DEFAULT_STYLE));
        assert!(!style_prompt("x").is_empty());
    }

    #[test]
    fn rotation_wraps() {
        assert_eq!(next_style("温柔型"), "撒娇型");
        assert_eq!(next_style("撒娇型"), "可爱型");
        assert_eq!(next_style("可爱型"), "日常型");
        assert_eq!(next_style("日常型"), "温柔型");
    }

    #[test]
    fn rotation_restarts_for_unlisted_style() {
        assert_eq!(next_style("高冷御姐型"), "温柔型");
    }

    #[test]
    fn catalogue_entries_have_prompts() {
        for (name, _) in catalogue() {
            assert_ne!(style_prompt(name), style_prompt(DEFAULT_STYLE));
        }
    }
}
