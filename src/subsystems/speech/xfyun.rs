//! Xunfei (iFlytek) streaming TTS / IAT over WebSocket.
//!
//! Both endpoints authenticate through query parameters produced by
//! [`signed_url`]: an HMAC-SHA256 over `host`, `date` and the request line,
//! wrapped in a base64 `authorization` blob.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::Sha256;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

use crate::config::XfyunCredentials;
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Audio bytes carried per ASR frame (40 ms of 16 kHz mono s16le).
const ASR_CHUNK: usize = 1280;
const ASR_FORMAT: &str = "audio/L16;rate=16000";

const STATUS_FIRST: u8 = 0;
const STATUS_CONTINUE: u8 = 1;
const STATUS_LAST: u8 = 2;

/// Build the authenticated WebSocket URL for `endpoint` at `now`.
pub fn signed_url(
    endpoint: &str,
    api_key: &str,
    api_secret: &str,
    now: DateTime<Utc>,
) -> Result<String, AppError> {
    let parsed = reqwest::Url::parse(endpoint)
        .map_err(|e| AppError::Speech(format!("invalid endpoint '{endpoint}': {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| AppError::Speech(format!("endpoint '{endpoint}' has no host")))?;
    let date = now.format("%a, %d %b %Y %H:%M:%S GMT").to_string();

    let origin = format!("host: {host}\ndate: {date}\nGET {} HTTP/1.1", parsed.path());
    let mut mac = HmacSha256::new_from_slice(api_secret.as_bytes())
        .map_err(|e| AppError::Speech(format!("hmac key: {e}")))?;
    mac.update(origin.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());

    let authorization = BASE64.encode(format!(
        "api_key=\"{api_key}\", algorithm=\"hmac-sha256\", headers=\"host date request-line\", signature=\"{signature}\""
    ));

    let url = reqwest::Url::parse_with_params(
        endpoint,
        &[("authorization", authorization.as_str()), ("date", date.as_str()), ("host", host)],
    )
    .map_err(|e| AppError::Speech(format!("invalid endpoint '{endpoint}': {e}")))?;
    Ok(url.into())
}

fn tts_frame(app_id: &str, voice_name: &str, text: &str) -> Value {
    json!({
        "common": { "app_id": app_id },
        "business": {
            "aue": "lame",
            "voice_name": voice_name,
            "speed": 50,
            "volume": 50,
            "pitch": 50,
            "engine_type": "intp65",
            "text_type": "text",
        },
        "data": {
            "status": STATUS_LAST,
            "text": BASE64.encode(text.as_bytes()),
        },
    })
}

/// Frames for one utterance: the first carries `common`/`business`, the last
/// is an empty `status: 2` marker.
fn asr_frames(app_id: &str, pcm: &[u8]) -> Vec<Value> {
    let mut frames = Vec::with_capacity(pcm.len() / ASR_CHUNK + 2);
    let mut chunks = pcm.chunks(ASR_CHUNK);
    let first = chunks.next().unwrap_or(&[]);
    frames.push(json!({
        "common": { "app_id": app_id },
        "business": {
            "language": "zh_cn",
            "domain": "iat",
            "accent": "mandarin",
            "vad_eos": 1000,
        },
        "data": {
            "status": STATUS_FIRST,
            "format": ASR_FORMAT,
            "encoding": "raw",
            "audio": BASE64.encode(first),
        },
    }));
    for chunk in chunks {
        frames.push(json!({
            "data": {
                "status": STATUS_CONTINUE,
                "format": ASR_FORMAT,
                "encoding": "raw",
                "audio": BASE64.encode(chunk),
            },
        }));
    }
    frames.push(json!({
        "data": { "status": STATUS_LAST, "format": ASR_FORMAT, "encoding": "raw", "audio": "" },
    }));
    frames
}

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<FrameData>,
}

#[derive(Debug, Deserialize)]
struct FrameData {
    status: Option<u8>,
    audio: Option<String>,
    result: Option<AsrResult>,
}

#[derive(Debug, Deserialize)]
struct AsrResult {
    #[serde(default)]
    ws: Vec<Word>,
}

#[derive(Debug, Deserialize)]
struct Word {
    #[serde(default)]
    cw: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    w: String,
}

fn parse_frame(text: &str) -> Result<Frame, AppError> {
    let frame: Frame = serde_json::from_str(text)
        .map_err(|e| AppError::Speech(format!("malformed xfyun frame: {e}")))?;
    if frame.code != 0 {
        return Err(AppError::Speech(format!("xfyun error {}: {}", frame.code, frame.message)));
    }
    Ok(frame)
}

impl AsrResult {
    fn text(&self) -> String {
        self.ws.iter().flat_map(|w| w.cw.iter()).map(|c| c.w.as_str()).collect()
    }
}

/// Synthesize `text` to MP3 bytes.
pub async fn synthesize(
    endpoint: &str,
    credentials: &XfyunCredentials,
    voice_name: &str,
    text: &str,
) -> Result<Vec<u8>, AppError> {
    let url = signed_url(endpoint, &credentials.api_key, &credentials.api_secret, Utc::now())?;
    let (stream, _) = connect_async(url.as_str())
        .await
        .map_err(|e| AppError::Speech(format!("tts connect: {e}")))?;
    let (mut write, mut read) = stream.split();

    let frame = tts_frame(&credentials.app_id, voice_name, text);
    write
        .send(Message::text(frame.to_string()))
        .await
        .map_err(|e| AppError::Speech(format!("tts send: {e}")))?;

    let mut audio = Vec::new();
    while let Some(msg) = read.next().await {
        let text = match msg.map_err(|e| AppError::Speech(format!("tts receive: {e}")))? {
            Message::Text(text) => text.as_str().to_owned(),
            Message::Close(_) => break,
            _ => continue,
        };
        let Some(data) = parse_frame(&text)?.data else {
            continue;
        };
        if let Some(chunk) = data.audio {
            let bytes = BASE64
                .decode(chunk)
                .map_err(|e| AppError::Speech(format!("tts audio decode: {e}")))?;
            audio.extend_from_slice(&bytes);
        }
        if data.status == Some(STATUS_LAST) {
            break;
        }
    }
    let _ = write.close().await;
    debug!(bytes = audio.len(), "tts finished");

    if audio.is_empty() {
        return Err(AppError::Speech("tts returned no audio".into()));
    }
    Ok(audio)
}

/// Transcribe 16 kHz mono s16le PCM.
pub async fn transcribe(
    endpoint: &str,
    credentials: &XfyunCredentials,
    pcm: &[u8],
) -> Result<String, AppError> {
    let url = signed_url(endpoint, &credentials.api_key, &credentials.api_secret, Utc::now())?;
    let (stream, _) = connect_async(url.as_str())
        .await
        .map_err(|e| AppError::Speech(format!("asr connect: {e}")))?;
    let (mut write, mut read) = stream.split();

    for frame in asr_frames(&credentials.app_id, pcm) {
        write
            .send(Message::text(frame.to_string()))
            .await
            .map_err(|e| AppError::Speech(format!("asr send: {e}")))?;
    }

    let mut transcript = String::new();
    while let Some(msg) = read.next().await {
        let text = match msg.map_err(|e| AppError::Speech(format!("asr receive: {e}")))? {
            Message::Text(text) => text.as_str().to_owned(),
            Message::Close(_) => break,
            _ => continue,
        };
        let Some(data) = parse_frame(&text)?.data else {
            continue;
        };
        if let Some(result) = &data.result {
            transcript.push_str(&result.text());
        }
        if data.status == Some(STATUS_LAST) {
            break;
        }
    }
    let _ = write.close().await;
    debug!(chars = transcript.chars().count(), "asr finished");
    Ok(transcript)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
    }

    #[test]
    fn signed_url_carries_auth_params() {
        let url = signed_url("wss://tts-api.xfyun.cn/v2/tts", "key", "secret", fixed_now()).unwrap();
        let parsed = reqwest::Url::parse(&url).unwrap();
        assert_eq!(parsed.scheme(), "wss");
        assert_eq!(parsed.path(), "/v2/tts");
        let params: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(params["host"], "tts-api.xfyun.cn");
        assert_eq!(params["date"], "Wed, 01 May 2024 08:30:00 GMT");

        let auth = String::from_utf8(BASE64.decode(&params["authorization"]).unwrap()).unwrap();
        assert!(auth.starts_with("api_key=\"key\", algorithm=\"hmac-sha256\""));
        assert!(auth.contains("headers=\"host date request-line\""));
    }

    #[test]
    fn signature_is_deterministic_per_secret() {
        let a = signed_url("wss://iat-api.xfyun.cn/v2/iat", "k", "s1", fixed_now()).unwrap();
        let b = signed_url("wss://iat-api.xfyun.cn/v2/iat", "k", "s1", fixed_now()).unwrap();
        let c = signed_url("wss://iat-api.xfyun.cn/v2/iat", "k", "s2", fixed_now()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn signed_url_rejects_garbage() {
        assert!(signed_url("not a url", "k", "s", fixed_now()).is_err());
    }

    #[test]
    fn tts_frame_shape() {
        let f = tts_frame("app", "x4_xiaoyan", "你好");
        assert_eq!(f["common"]["app_id"], "app");
        assert_eq!(f["business"]["aue"], "lame");
        assert_eq!(f["business"]["voice_name"], "x4_xiaoyan");
        assert_eq!(f["business"]["engine_type"], "intp65");
        assert_eq!(f["data"]["status"], 2);
        let text = BASE64.decode(f["data"]["text"].as_str().unwrap()).unwrap();
        assert_eq!(String::from_utf8(text).unwrap(), "你好");
    }

    #[test]
    fn asr_frames_chunk_audio() {
        let pcm = vec![0u8; ASR_CHUNK * 2 + 10];
        let frames = asr_frames("app", &pcm);
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0]["data"]["status"], 0);
        assert_eq!(frames[0]["business"]["language"], "zh_cn");
        assert_eq!(frames[1]["data"]["status"], 1);
        assert!(frames[1].get("common").is_none());
        assert_eq!(frames[3]["data"]["status"], 2);
        assert_eq!(frames[3]["data"]["audio"], "");
    }

    #[test]
    fn asr_frames_for_empty_audio() {
        let frames = asr_frames("app", &[]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["data"]["audio"], "");
    }

    #[test]
    fn parse_asr_result_words() {
        let raw = r#"{"code":0,"message":"success","sid":"x","data":{"status":2,
            "result":{"ws":[{"cw":[{"w":"你好"}]},{"cw":[{"w":"呀"}]}]}}}"#;
        let frame = parse_frame(raw).unwrap();
        let data = frame.data.unwrap();
        assert_eq!(data.result.unwrap().text(), "你好呀");
        assert_eq!(data.status, Some(2));
    }

    #[test]
    fn parse_frame_surfaces_error_code() {
        let err = parse_frame(r#"{"code":10165,"message":"invalid handle"}"#).unwrap_err();
        assert!(err.to_string().contains("10165"));
    }
}
