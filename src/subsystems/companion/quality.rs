//! Reply quality heuristic deciding which exchanges are worth keeping.

const MIN_CHARS: usize = 5;

/// Stock phrases that make a reply read as a filler question.
const GENERIC_RESPONSES: &[&str] = &[
    "有什么想说的都可以告诉我",
    "有什么想和我分享的吗",
    "有什么特别的事情想和我分享吗",
    "有什么想聊的吗",
    "今天怎么啦",
    "怎么啦",
    "有什么想说的吗",
    "现在怎样",
    "有什么我可以帮你的吗",
    "小悠最近在想什么",
    "让我知道你最近在忙些什么",
    "想要和我多聊聊天吗",
    "有什么特别的事情想告诉我吗",
    "现在是什么时候了",
    "现在是什么时间了",
    "最近过得怎么样",
    "最近怎么样",
    "最近在忙什么",
    "最近在做什么",
    "最近有什么想说的吗",
    "最近有什么想分享的吗",
    "最近有什么特别的事情吗",
    "最近有什么想和我说的吗",
    "最近有什么想和我分享的吗",
    "最近有什么特别想和我说的吗",
    "最近有什么特别想和我分享的吗",
];

/// Indicator words grouped by category; any hit counts as emotional content.
const QUALITY_INDICATORS: &[(&str, &[&str])] = &[
    ("情感表达", &["爱", "喜欢", "想你", "思念", "开心", "幸福", "温暖", "甜蜜"]),
    ("互动元素", &["抱抱", "亲亲", "摸摸", "蹭蹭", "撒娇", "哼"]),
    ("关心体贴", &["注意", "小心", "照顾", "关心", "担心", "心疼"]),
    ("生活细节", &["吃饭", "睡觉", "工作", "学习", "休息", "运动"]),
    ("浪漫元素", &["浪漫", "甜蜜", "温暖", "幸福", "美好", "温馨"]),
    ("情绪支持", &["加油", "支持", "鼓励", "安慰", "理解", "陪伴"]),
];

const STRUCTURE_MARKS: &[char] = &['？', '！', '，', '。', '~', '['];

const PERSONAL_WORDS: &[&str] = &["你", "我", "我们", "一起"];

/// `true` when `reply` is specific, emotionally warm and well-formed.
pub fn is_high_quality_reply(reply: &str) -> bool {
    if reply.trim().chars().count() < MIN_CHARS {
        return false;
    }
    if GENERIC_RESPONSES.iter().any(|g| reply.contains(g)) {
        return false;
    }

    let has_emotional_content = QUALITY_INDICATORS
        .iter()
        .any(|(_, words)| words.iter().any(|w| reply.contains(w)));

    let has_structure =
        reply.split_whitespace().count() > 10 || reply.contains(STRUCTURE_MARKS);

    let has_personalization = PERSONAL_WORDS.iter().any(|w| reply.contains(w));

    has_emotional_content && (has_structure || has_personalization)
}
