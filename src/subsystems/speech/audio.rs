//! ffmpeg conversion of uploaded recordings to the PCM format the ASR
//! endpoint expects.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::AppError;

/// Longest stderr tail kept in an error message.
const STDERR_TAIL: usize = 400;

/// `ffmpeg -y -i input -f s16le -acodec pcm_s16le -ac 1 -ar 16000 output`
pub fn pcm_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        input.display().to_string(),
        "-f".into(),
        "s16le".into(),
        "-acodec".into(),
        "pcm_s16le".into(),
        "-ac".into(),
        "1".into(),
        "-ar".into(),
        "16000".into(),
        output.display().to_string(),
    ]
}

/// Convert any ffmpeg-readable file at `input` to 16 kHz mono s16le at `output`.
pub async fn convert_to_pcm(
    ffmpeg_bin: &str,
    input: &Path,
    output: &Path,
    timeout: Duration,
) -> Result<(), AppError> {
    let child = Command::new(ffmpeg_bin)
        .args(pcm_args(input, output))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| AppError::Speech(format!("failed to spawn {ffmpeg_bin}: {e}")))?;

    let out = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| AppError::Speech(format!("{ffmpeg_bin} timed out after {timeout:?}")))?
        .map_err(|e| AppError::Speech(format!("{ffmpeg_bin}: {e}")))?;

    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        let tail: String = {
            let chars: Vec<char> = stderr.trim().chars().collect();
            chars[chars.len().saturating_sub(STDERR_TAIL)..].iter().collect()
        };
        return Err(AppError::Speech(format!(
            "{ffmpeg_bin} exited with {}: {tail}",
            out.status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_target_16k_mono() {
        let args = pcm_args(Path::new("/tmp/in.wav"), Path::new("/tmp/out.pcm"));
        assert_eq!(args.first().map(String::as_str), Some("-y"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.pcm"));
        let joined = args.join(" ");
        assert!(joined.contains("-i /tmp/in.wav"));
        assert!(joined.contains("-ac 1 -ar 16000"));
        assert!(joined.contains("-f s16le -acodec pcm_s16le"));
    }

    #[tokio::test]
    async fn missing_binary_is_speech_error() {
        let err = convert_to_pcm(
            "definitely-not-an-ffmpeg-binary",
            Path::new("in.wav"),
            Path::new("out.pcm"),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Speech(_)));
    }
}
