//! Speech subsystem — Xunfei text-to-speech and speech recognition.
//!
//! Synthesized MP3s are written under `audio_dir` and served back by the
//! HTTP channel. ASR uploads are stored there only for the duration of one
//! conversion and are removed afterwards, success or not.

pub mod audio;
pub mod xfyun;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{SpeechConfig, XfyunCredentials, is_plain_file_name};
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct SpeechService {
    config: SpeechConfig,
}

impl SpeechService {
    pub fn new(config: SpeechConfig) -> Self {
        Self { config }
    }

    pub fn audio_dir(&self) -> &Path {
        &self.config.audio_dir
    }

    fn credentials(&self) -> Result<&XfyunCredentials, AppError> {
        self.config
            .credentials
            .as_ref()
            .ok_or_else(|| AppError::Speech("XFYUN_APP_ID / XFYUN_API_KEY / XFYUN_API_SECRET not set".into()))
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }

    /// Synthesize `text` and write `tts_{millis}.mp3` into the audio directory.
    pub async fn synthesize(&self, text: &str) -> Result<PathBuf, AppError> {
        let credentials = self.credentials()?;
        let audio = tokio::time::timeout(
            self.timeout(),
            xfyun::synthesize(&self.config.tts_url, credentials, &self.config.voice_name, text),
        )
        .await
        .map_err(|_| AppError::Speech("tts timed out".into()))??;

        tokio::fs::create_dir_all(&self.config.audio_dir).await?;
        let path = self
            .config
            .audio_dir
            .join(format!("tts_{}.mp3", chrono::Utc::now().timestamp_millis()));
        tokio::fs::write(&path, &audio).await?;
        info!(file = %path.display(), bytes = audio.len(), "tts audio written");
        Ok(path)
    }

    /// Transcribe raw 16 kHz mono s16le PCM.
    pub async fn transcribe(&self, pcm: &[u8]) -> Result<String, AppError> {
        let credentials = self.credentials()?;
        tokio::time::timeout(self.timeout(), xfyun::transcribe(&self.config.asr_url, credentials, pcm))
            .await
            .map_err(|_| AppError::Speech("asr timed out".into()))?
    }

    /// Store an uploaded recording, convert it with ffmpeg and transcribe it.
    /// `original_name` only contributes its extension.
    pub async fn transcribe_upload(&self, original_name: &str, bytes: &[u8]) -> Result<String, AppError> {
        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("wav");
        let stem = format!("asr_{}", uuid::Uuid::new_v4().simple());
        tokio::fs::create_dir_all(&self.config.audio_dir).await?;
        let raw = self.config.audio_dir.join(format!("{stem}.{ext}"));
        let pcm = self.config.audio_dir.join(format!("{stem}.pcm"));

        let result = async {
            tokio::fs::write(&raw, bytes).await?;
            audio::convert_to_pcm(&self.config.ffmpeg_bin, &raw, &pcm, self.timeout()).await?;
            let samples = tokio::fs::read(&pcm).await?;
            self.transcribe(&samples).await
        }
        .await;

        for path in [&raw, &pcm] {
            match tokio::fs::remove_file(path).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    warn!(file = %path.display(), "could not remove temporary audio: {e}");
                }
                _ => {}
            }
        }
        result
    }

    /// Resolve a served audio file. Only plain file names inside the audio
    /// directory are accepted.
    pub fn resolve_audio(&self, filename: &str) -> Option<PathBuf> {
        if !is_plain_file_name(filename) {
            return None;
        }
        let path = self.config.audio_dir.join(filename);
        path.is_file().then_some(path)
    }
}
