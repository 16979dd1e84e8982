//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or the path given with `-f`), then applies
//! `COMPANION_WORK_DIR` and `COMPANION_LOG_LEVEL` env overrides.  Secrets are
//! never read from TOML: API keys come from the environment (`.env` is loaded
//! by `main` before this runs).

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;
use crate::logger;

/// PTY (console) channel configuration.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    pub enabled: bool,
}

/// HTTP channel configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    /// Socket address to bind the HTTP channel to.
    pub bind: String,
}

#[derive(Debug, Clone)]
pub struct CommsConfig {
    pub pty: PtyConfig,
    pub http: HttpConfig,
}

/// Dify workflow endpoint configuration (`[llm.dify]`).
#[derive(Debug, Clone)]
pub struct DifyConfig {
    /// API root, e.g. `http://localhost:5001/v1`.
    pub api_base_url: String,
    pub workflow_id: String,
    /// Value sent as the `user` field of every workflow run.
    pub user: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Active provider: `"dummy"` or `"dify"`.
    pub provider: String,
    pub dify: DifyConfig,
}

/// Knowledge-base upload settings (`[knowledge]`).
#[derive(Debug, Clone)]
pub struct KnowledgeConfig {
    pub enabled: bool,
    pub kb_id: String,
    pub user_id: String,
    /// `DIFY_DATASET_API_KEY`: dataset API key, distinct from the app key.
    pub dataset_api_key: Option<String>,
}

/// Local memory files and context limits (`[memory]`).
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub growth_log_file: PathBuf,
    pub dialog_file: PathBuf,
    /// Upper bound on the growth-log text injected into one request.
    pub growth_log_max_chars: usize,
    /// Entries kept by the nightly growth-log compaction.
    pub growth_log_keep: usize,
    /// Conversation turns sent as `conversation_history`.
    pub history_turns: usize,
    /// Cosine threshold above which a Q/A pair counts as a duplicate.
    pub similarity_threshold: f32,
}

/// Default persona used by console and auto modes (`[companion]`).
#[derive(Debug, Clone)]
pub struct CompanionConfig {
    pub name: String,
    pub personality: String,
    pub interests: Vec<String>,
    pub background: String,
    pub style_type: String,
    /// Directory holding prompt template layers.
    pub prompts_dir: PathBuf,
}

/// Xunfei credentials, all three sourced from env.
#[derive(Debug, Clone)]
pub struct XfyunCredentials {
    pub app_id: String,
    pub api_key: String,
    pub api_secret: String,
}

/// Speech (TTS/ASR) configuration (`[speech]`).
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub tts_url: String,
    pub asr_url: String,
    pub voice_name: String,
    pub audio_dir: PathBuf,
    pub ffmpeg_bin: String,
    pub timeout_seconds: u64,
    /// `None` when any of `XFYUN_APP_ID` / `XFYUN_API_KEY` / `XFYUN_API_SECRET` is missing.
    pub credentials: Option<XfyunCredentials>,
}

/// Auto-companion schedule (`[cron]`).  Times are local `HH:MM`.
#[derive(Debug, Clone)]
pub struct CronConfig {
    pub morning_at: (u32, u32),
    pub night_at: (u32, u32),
    pub organize_at: (u32, u32),
    pub quality_check_every_secs: u64,
    pub inactivity_check_every_secs: u64,
    pub inactivity_threshold_secs: u64,
    pub auto_dialog_min_secs: u64,
    pub auto_dialog_max_secs: u64,
}

/// Fully-resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    /// Working directory for all persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    /// Optional append-mode log file; stderr when unset.
    pub log_file: Option<PathBuf>,
    pub comms: CommsConfig,
    pub llm: LlmConfig,
    /// `DIFY_API_KEY`; `None` is only valid for the dummy provider.
    pub llm_api_key: Option<String>,
    pub knowledge: KnowledgeConfig,
    pub memory: MemoryConfig,
    pub companion: CompanionConfig,
    pub speech: SpeechConfig,
    pub cron: CronConfig,
}

impl Config {
    pub fn comms_pty_should_load(&self) -> bool {
        self.comms.pty.enabled
    }

    pub fn comms_http_should_load(&self) -> bool {
        self.comms.http.enabled
    }
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawConfig {
    service: RawService,
    #[serde(default)]
    comms: RawComms,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    knowledge: RawKnowledge,
    #[serde(default)]
    memory: RawMemory,
    #[serde(default)]
    companion: RawCompanion,
    #[serde(default)]
    speech: RawSpeech,
    #[serde(default)]
    cron: RawCron,
}

#[derive(Deserialize)]
struct RawService {
    bot_name: String,
    work_dir: String,
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawComms {
    #[serde(default)]
    pty: RawPty,
    #[serde(default)]
    http: RawHttp,
}

#[derive(Deserialize, Default)]
struct RawPty {
    /// Defaults to `false`: the console only runs with `-i`.
    #[serde(default)]
    enabled: bool,
}

#[derive(Deserialize)]
struct RawHttp {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_http_bind")]
    bind: String,
}

impl Default for RawHttp {
    fn default() -> Self {
        Self { enabled: true, bind: default_http_bind() }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    dify: RawDify,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self { provider: default_llm_provider(), dify: RawDify::default() }
    }
}

#[derive(Deserialize)]
struct RawDify {
    #[serde(default = "default_dify_api_base_url")]
    api_base_url: String,
    #[serde(default)]
    workflow_id: String,
    #[serde(default = "default_user")]
    user: String,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawDify {
    fn default() -> Self {
        Self {
            api_base_url: default_dify_api_base_url(),
            workflow_id: String::new(),
            user: default_user(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawKnowledge {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    kb_id: String,
    #[serde(default = "default_user")]
    user_id: String,
}

impl Default for RawKnowledge {
    fn default() -> Self {
        Self { enabled: true, kb_id: String::new(), user_id: default_user() }
    }
}

#[derive(Deserialize)]
struct RawMemory {
    #[serde(default = "default_growth_log_file")]
    growth_log_file: String,
    #[serde(default = "default_dialog_file")]
    dialog_file: String,
    #[serde(default = "default_growth_log_max_chars")]
    growth_log_max_chars: usize,
    #[serde(default = "default_growth_log_keep")]
    growth_log_keep: usize,
    #[serde(default = "default_history_turns")]
    history_turns: usize,
    #[serde(default = "default_similarity_threshold")]
    similarity_threshold: f32,
}

impl Default for RawMemory {
    fn default() -> Self {
        Self {
            growth_log_file: default_growth_log_file(),
            dialog_file: default_dialog_file(),
            growth_log_max_chars: default_growth_log_max_chars(),
            growth_log_keep: default_growth_log_keep(),
            history_turns: default_history_turns(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

#[derive(Deserialize)]
struct RawCompanion {
    #[serde(default = "default_companion_name")]
    name: String,
    #[serde(default = "default_personality")]
    personality: String,
    #[serde(default)]
    interests: Vec<String>,
    #[serde(default)]
    background: String,
    #[serde(default = "default_style_type")]
    style_type: String,
    #[serde(default = "default_prompts_dir")]
    prompts_dir: String,
}

impl Default for RawCompanion {
    fn default() -> Self {
        Self {
            name: default_companion_name(),
            personality: default_personality(),
            interests: Vec::new(),
            background: String::new(),
            style_type: default_style_type(),
            prompts_dir: default_prompts_dir(),
        }
    }
}

#[derive(Deserialize)]
struct RawSpeech {
    #[serde(default = "default_tts_url")]
    tts_url: String,
    #[serde(default = "default_asr_url")]
    asr_url: String,
    #[serde(default = "default_voice_name")]
    voice_name: String,
    #[serde(default = "default_audio_dir")]
    audio_dir: String,
    #[serde(default = "default_ffmpeg_bin")]
    ffmpeg_bin: String,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawSpeech {
    fn default() -> Self {
        Self {
            tts_url: default_tts_url(),
            asr_url: default_asr_url(),
            voice_name: default_voice_name(),
            audio_dir: default_audio_dir(),
            ffmpeg_bin: default_ffmpeg_bin(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawCron {
    #[serde(default = "default_morning_at")]
    morning_at: String,
    #[serde(default = "default_night_at")]
    night_at: String,
    #[serde(default = "default_organize_at")]
    organize_at: String,
    #[serde(default = "default_quality_check_every_secs")]
    quality_check_every_secs: u64,
    #[serde(default = "default_inactivity_check_every_secs")]
    inactivity_check_every_secs: u64,
    #[serde(default = "default_inactivity_threshold_secs")]
    inactivity_threshold_secs: u64,
    #[serde(default = "default_auto_dialog_min_secs")]
    auto_dialog_min_secs: u64,
    #[serde(default = "default_auto_dialog_max_secs")]
    auto_dialog_max_secs: u64,
}

impl Default for RawCron {
    fn default() -> Self {
        Self {
            morning_at: default_morning_at(),
            night_at: default_night_at(),
            organize_at: default_organize_at(),
            quality_check_every_secs: default_quality_check_every_secs(),
            inactivity_check_every_secs: default_inactivity_check_every_secs(),
            inactivity_threshold_secs: default_inactivity_threshold_secs(),
            auto_dialog_min_secs: default_auto_dialog_min_secs(),
            auto_dialog_max_secs: default_auto_dialog_max_secs(),
        }
    }
}

fn default_true() -> bool { true }
fn default_http_bind() -> String { "127.0.0.1:8000".to_string() }
fn default_llm_provider() -> String { "dummy".to_string() }
fn default_dify_api_base_url() -> String { "http://localhost:5001/v1".to_string() }
fn default_user() -> String { "user_1".to_string() }
fn default_timeout_seconds() -> u64 { 60 }
fn default_growth_log_file() -> String { "growth_log.txt".to_string() }
fn default_dialog_file() -> String { "companion_dialogs.md".to_string() }
fn default_growth_log_max_chars() -> usize { 500 }
fn default_growth_log_keep() -> usize { 100 }
fn default_history_turns() -> usize { 8 }
fn default_similarity_threshold() -> f32 { 0.85 }
fn default_companion_name() -> String { "小悠".to_string() }
fn default_personality() -> String { "温柔体贴".to_string() }
fn default_style_type() -> String { "温柔型".to_string() }
fn default_prompts_dir() -> String { "config/prompts".to_string() }
fn default_tts_url() -> String { "wss://tts-api.xfyun.cn/v2/tts".to_string() }
fn default_asr_url() -> String { "wss://iat-api.xfyun.cn/v2/iat".to_string() }
fn default_voice_name() -> String { "x4_xiaoyan".to_string() }
fn default_audio_dir() -> String { "audio_files".to_string() }
fn default_ffmpeg_bin() -> String { "ffmpeg".to_string() }
fn default_morning_at() -> String { "08:00".to_string() }
fn default_night_at() -> String { "22:00".to_string() }
fn default_organize_at() -> String { "02:00".to_string() }
fn default_quality_check_every_secs() -> u64 { 3600 }
fn default_inactivity_check_every_secs() -> u64 { 60 }
fn default_inactivity_threshold_secs() -> u64 { 2 * 3600 }
fn default_auto_dialog_min_secs() -> u64 { 3600 }
fn default_auto_dialog_max_secs() -> u64 { 3 * 3600 }

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load config from `path` (default `config/default.toml`), then apply
/// env-var overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let work_dir_override = env::var("COMPANION_WORK_DIR").ok();
    let log_level_override = env::var("COMPANION_LOG_LEVEL").ok();
    let path = Path::new(path.unwrap_or("config/default.toml"));
    let mut config = load_from(path, work_dir_override.as_deref(), log_level_override.as_deref())?;

    config.llm_api_key = env::var("DIFY_API_KEY").ok().filter(|k| !k.is_empty());
    config.knowledge.dataset_api_key =
        env::var("DIFY_DATASET_API_KEY").ok().filter(|k| !k.is_empty());
    config.speech.credentials = match (
        env::var("XFYUN_APP_ID"),
        env::var("XFYUN_API_KEY"),
        env::var("XFYUN_API_SECRET"),
    ) {
        (Ok(app_id), Ok(api_key), Ok(api_secret)) => {
            Some(XfyunCredentials { app_id, api_key, api_secret })
        }
        _ => None,
    };

    Ok(config)
}

/// Internal loader: accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars; secrets are
/// left unset.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let s = parsed.service;

    let work_dir = expand_home(work_dir_override.unwrap_or(&s.work_dir));
    let log_level = log_level_override.unwrap_or(&s.log_level).to_string();
    logger::parse_level(&log_level)
        .map_err(|e| AppError::Config(format!("service.log_level: {e}")))?;
    let in_work_dir = |p: &str| {
        let path = expand_home(p);
        if path.is_absolute() { path } else { work_dir.join(path) }
    };

    let c = parsed.cron;
    if c.auto_dialog_min_secs == 0 || c.auto_dialog_min_secs > c.auto_dialog_max_secs {
        return Err(AppError::Config(format!(
            "cron auto_dialog range invalid: {}..{}",
            c.auto_dialog_min_secs, c.auto_dialog_max_secs
        )));
    }
    let cron = CronConfig {
        morning_at: parse_hh_mm(&c.morning_at)?,
        night_at: parse_hh_mm(&c.night_at)?,
        organize_at: parse_hh_mm(&c.organize_at)?,
        quality_check_every_secs: c.quality_check_every_secs,
        inactivity_check_every_secs: c.inactivity_check_every_secs,
        inactivity_threshold_secs: c.inactivity_threshold_secs,
        auto_dialog_min_secs: c.auto_dialog_min_secs,
        auto_dialog_max_secs: c.auto_dialog_max_secs,
    };

    let m = parsed.memory;
    if !(0.0..=1.0).contains(&m.similarity_threshold) {
        return Err(AppError::Config(format!(
            "memory.similarity_threshold must be within 0..=1, got {}",
            m.similarity_threshold
        )));
    }

    Ok(Config {
        bot_name: s.bot_name,
        log_file: s.log_file.as_deref().map(in_work_dir),
        log_level,
        comms: CommsConfig {
            pty: PtyConfig { enabled: parsed.comms.pty.enabled },
            http: HttpConfig {
                enabled: parsed.comms.http.enabled,
                bind: parsed.comms.http.bind,
            },
        },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            dify: DifyConfig {
                api_base_url: parsed.llm.dify.api_base_url.trim_end_matches('/').to_string(),
                workflow_id: parsed.llm.dify.workflow_id,
                user: parsed.llm.dify.user,
                timeout_seconds: parsed.llm.dify.timeout_seconds,
            },
        },
        llm_api_key: None,
        knowledge: KnowledgeConfig {
            enabled: parsed.knowledge.enabled,
            kb_id: parsed.knowledge.kb_id,
            user_id: parsed.knowledge.user_id,
            dataset_api_key: None,
        },
        memory: MemoryConfig {
            growth_log_file: in_work_dir(&m.growth_log_file),
            dialog_file: in_work_dir(&m.dialog_file),
            growth_log_max_chars: m.growth_log_max_chars,
            growth_log_keep: m.growth_log_keep,
            history_turns: m.history_turns,
            similarity_threshold: m.similarity_threshold,
        },
        companion: CompanionConfig {
            name: parsed.companion.name,
            personality: parsed.companion.personality,
            interests: parsed.companion.interests,
            background: parsed.companion.background,
            style_type: parsed.companion.style_type,
            prompts_dir: expand_home(&parsed.companion.prompts_dir),
        },
        speech: SpeechConfig {
            tts_url: parsed.speech.tts_url,
            asr_url: parsed.speech.asr_url,
            voice_name: parsed.speech.voice_name,
            audio_dir: in_work_dir(&parsed.speech.audio_dir),
            ffmpeg_bin: parsed.speech.ffmpeg_bin,
            timeout_seconds: parsed.speech.timeout_seconds,
            credentials: None,
        },
        cron,
        work_dir,
    })
}

/// Parse a local wall-clock time `"HH:MM"`.
pub fn parse_hh_mm(s: &str) -> Result<(u32, u32), AppError> {
    let bad = || AppError::Config(format!("invalid time of day '{s}', expected HH:MM"));
    let (h, m) = s.trim().split_once(':').ok_or_else(bad)?;
    let h: u32 = h.parse().map_err(|_| bad())?;
    let m: u32 = m.parse().map_err(|_| bad())?;
    if h > 23 || m > 59 {
        return Err(bad());
    }
    Ok((h, m))
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// `true` for a single path component: no separators, no `.`/`..`.
/// Used to keep request-supplied file names inside their directory.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for tests: dummy LLM, no API keys, all files under `work_dir`.
impl Config {
    pub fn test_default(work_dir: &Path) -> Self {
        Self {
            bot_name: "test".into(),
            work_dir: work_dir.to_path_buf(),
            log_level: "info".into(),
            log_file: None,
            comms: CommsConfig {
                pty: PtyConfig { enabled: false },
                http: HttpConfig { enabled: false, bind: default_http_bind() },
            },
            llm: LlmConfig {
                provider: "dummy".into(),
                dify: DifyConfig {
                    api_base_url: "http://localhost:0/v1".into(),
                    workflow_id: "test-workflow".into(),
                    user: default_user(),
                    timeout_seconds: 1,
                },
            },
            llm_api_key: None,
            knowledge: KnowledgeConfig {
                enabled: false,
                kb_id: String::new(),
                user_id: default_user(),
                dataset_api_key: None,
            },
            memory: MemoryConfig {
                growth_log_file: work_dir.join(default_growth_log_file()),
                dialog_file: work_dir.join(default_dialog_file()),
                growth_log_max_chars: default_growth_log_max_chars(),
                growth_log_keep: default_growth_log_keep(),
                history_turns: default_history_turns(),
                similarity_threshold: default_similarity_threshold(),
            },
            companion: CompanionConfig {
                name: default_companion_name(),
                personality: default_personality(),
                interests: vec!["看电影".into()],
                background: String::new(),
                style_type: default_style_type(),
                prompts_dir: PathBuf::from(default_prompts_dir()),
            },
            speech: SpeechConfig {
                tts_url: default_tts_url(),
                asr_url: default_asr_url(),
                voice_name: default_voice_name(),
                audio_dir: work_dir.join(default_audio_dir()),
                ffmpeg_bin: default_ffmpeg_bin(),
                timeout_seconds: 1,
                credentials: None,
            },
            cron: CronConfig {
                morning_at: (8, 0),
                night_at: (22, 0),
                organize_at: (2, 0),
                quality_check_every_secs: default_quality_check_every_secs(),
                inactivity_check_every_secs: default_inactivity_check_every_secs(),
                inactivity_threshold_secs: default_inactivity_threshold_secs(),
                auto_dialog_min_secs: default_auto_dialog_min_secs(),
                auto_dialog_max_secs: default_auto_dialog_max_secs(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[service]
bot_name = "test-bot"
work_dir = "/tmp/companion"
log_level = "info"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn plain_file_names_only() {
        assert!(is_plain_file_name("conversation_history.json"));
        assert!(!is_plain_file_name("../secret"));
        assert!(!is_plain_file_name("a/b.json"));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name(""));
    }

    #[test]
    fn parse_minimal_config_applies_defaults() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.bot_name, "test-bot");
        assert_eq!(cfg.llm.provider, "dummy");
        assert_eq!(cfg.memory.growth_log_max_chars, 500);
        assert_eq!(cfg.memory.growth_log_file, PathBuf::from("/tmp/companion/growth_log.txt"));
        assert_eq!(cfg.companion.style_type, "温柔型");
        assert_eq!(cfg.cron.morning_at, (8, 0));
        assert!(cfg.comms_http_should_load());
        assert!(!cfg.comms_pty_should_load());
    }

    #[test]
    fn dify_base_url_trailing_slash_trimmed() {
        let f = write_toml(&format!(
            "{MINIMAL_TOML}\n[llm]\ndefault = \"dify\"\n[llm.dify]\napi_base_url = \"http://dify.local/v1/\"\nworkflow_id = \"wf\"\n"
        ));
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.llm.provider, "dify");
        assert_eq!(cfg.llm.dify.api_base_url, "http://dify.local/v1");
        assert_eq!(cfg.llm.dify.workflow_id, "wf");
    }

    #[test]
    fn invalid_cron_time_errors() {
        let f = write_toml(&format!("{MINIMAL_TOML}\n[cron]\nmorning_at = \"25:00\"\n"));
        let err = load_from(f.path(), None, None).unwrap_err();
        assert!(err.to_string().contains("25:00"));
    }

    #[test]
    fn invalid_similarity_threshold_errors() {
        let f = write_toml(&format!("{MINIMAL_TOML}\n[memory]\nsimilarity_threshold = 1.5\n"));
        assert!(load_from(f.path(), None, None).is_err());
    }

    #[test]
    fn parse_hh_mm_accepts_and_rejects() {
        assert_eq!(parse_hh_mm("08:00").unwrap(), (8, 0));
        assert_eq!(parse_hh_mm(" 22:30 ").unwrap(), (22, 30));
        assert!(parse_hh_mm("8").is_err());
        assert!(parse_hh_mm("12:60").is_err());
    }

    #[test]
    fn absolute_memory_paths_kept() {
        let f = write_toml(&format!(
            "{MINIMAL_TOML}\n[memory]\ngrowth_log_file = \"/var/lib/companion/log.txt\"\n"
        ));
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.memory.growth_log_file, PathBuf::from("/var/lib/companion/log.txt"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/.companion");
        assert!(expanded.starts_with(&home));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), None, None);
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn unknown_log_level_rejected_at_load() {
        let f = write_toml(&MINIMAL_TOML.replace("\"info\"", "\"loud\""));
        let msg = load_from(f.path(), None, None).unwrap_err().to_string();
        assert!(msg.contains("service.log_level"), "{msg}");
        assert!(msg.contains("loud"), "{msg}");

        let f = write_toml(MINIMAL_TOML);
        assert!(load_from(f.path(), None, Some("chatty")).is_err());
    }

    #[test]
    fn env_overrides_applied() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), Some("/tmp/override"), Some("debug")).unwrap();
        assert_eq!(cfg.work_dir, PathBuf::from("/tmp/override"));
        assert_eq!(cfg.memory.dialog_file, PathBuf::from("/tmp/override/companion_dialogs.md"));
        assert_eq!(cfg.log_level, "debug");
    }
}
