//! Knowledge-base uploads — harvested Q/A pairs pushed to a Dify dataset.
//!
//! `POST {base}/datasets/{kb_id}/document/create_by_text` with the dataset
//! API key (distinct from the workflow app key). Without a key or dataset id
//! the uploader is disabled and every upload is a logged no-op.

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AppError;

#[derive(Debug, Clone)]
struct Target {
    client: Client,
    api_base_url: String,
    kb_id: String,
    api_key: String,
}

/// Cheaply cloneable uploader; `Clone` shares the inner HTTP client.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    target: Option<Target>,
    user_id: String,
}

#[derive(Debug, Serialize)]
struct CreateByText<'a> {
    name: String,
    text: String,
    indexing_technique: &'static str,
    process_rule: ProcessRule,
    metadata: Metadata<'a>,
}

#[derive(Debug, Serialize)]
struct ProcessRule {
    mode: &'static str,
}

#[derive(Debug, Serialize)]
struct Metadata<'a> {
    style_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<&'a str>,
}

impl KnowledgeBase {
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let kb = &config.knowledge;
        let target = match (&kb.dataset_api_key, kb.enabled && !kb.kb_id.is_empty()) {
            (Some(key), true) => {
                let client = Client::builder()
                    .timeout(std::time::Duration::from_secs(config.llm.dify.timeout_seconds))
                    .build()
                    .map_err(|e| AppError::Knowledge(format!("failed to build HTTP client: {e}")))?;
                Some(Target {
                    client,
                    api_base_url: config.llm.dify.api_base_url.clone(),
                    kb_id: kb.kb_id.clone(),
                    api_key: key.clone(),
                })
            }
            _ => None,
        };
        Ok(Self { target, user_id: kb.user_id.clone() })
    }

    /// An uploader that never sends anything.
    pub fn disabled() -> Self {
        Self { target: None, user_id: String::new() }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Upload one Q/A pair as a new dataset document.
    pub async fn upload(
        &self,
        question: &str,
        answer: &str,
        tag: Option<&str>,
        style_type: &str,
    ) -> Result<(), AppError> {
        let Some(target) = &self.target else {
            debug!("knowledge base disabled, skipping upload");
            return Ok(());
        };

        let body = build_document(question, answer, tag, style_type, &self.user_id);
        let url = format!(
            "{}/datasets/{}/document/create_by_text",
            target.api_base_url, target.kb_id
        );
        let response = target
            .client
            .post(&url)
            .bearer_auth(&target.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Knowledge(format!("upload request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(%status, body = %text, "knowledge upload rejected");
            return Err(AppError::Knowledge(format!("HTTP {status}: {text}")));
        }
        info!(document = %body.name, tag = ?tag, "uploaded dialog to knowledge base");
        Ok(())
    }
}

fn build_document<'a>(
    question: &str,
    answer: &str,
    tag: Option<&'a str>,
    style_type: &'a str,
    user_id: &'a str,
) -> CreateByText<'a> {
    CreateByText {
        name: format!("对话-{}", chrono::Local::now().format("%H%M%S")),
        text: format!("Q: {question}\nA: {answer}"),
        indexing_technique: "high_quality",
        process_rule: ProcessRule { mode: "automatic" },
        metadata: Metadata {
            style_type,
            user_id: (!user_id.is_empty()).then_some(user_id),
            tag,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_shape() {
        let doc = build_document("想你", "我也想你", Some("情感-思念"), "温柔型", "user_1");
        let v = serde_json::to_value(&doc).unwrap();
        assert!(v["name"].as_str().unwrap().starts_with("对话-"));
        assert_eq!(v["name"].as_str().unwrap().chars().count(), 9);
        assert_eq!(v["text"], "Q: 想你\nA: 我也想你");
        assert_eq!(v["indexing_technique"], "high_quality");
        assert_eq!(v["process_rule"]["mode"], "automatic");
        assert_eq!(v["metadata"]["style_type"], "温柔型");
        assert_eq!(v["metadata"]["user_id"], "user_1");
        assert_eq!(v["metadata"]["tag"], "情感-思念");
    }

    #[test]
    fn optional_metadata_omitted() {
        let doc = build_document("q", "a", None, "日常型", "");
        let v = serde_json::to_value(&doc).unwrap();
        assert!(v["metadata"].get("tag").is_none());
        assert!(v["metadata"].get("user_id").is_none());
    }

    #[test]
    fn no_dataset_key_disables_uploads() {
        let mut cfg = Config::test_default(std::path::Path::new("/tmp"));
        cfg.knowledge.enabled = true;
        cfg.knowledge.kb_id = "kb".into();
        assert!(!KnowledgeBase::from_config(&cfg).unwrap().is_enabled());
        cfg.knowledge.dataset_api_key = Some("dataset-key".into());
        assert!(KnowledgeBase::from_config(&cfg).unwrap().is_enabled());
    }

    #[tokio::test]
    async fn disabled_upload_is_noop() {
        let kb = KnowledgeBase::disabled();
        assert!(kb.upload("q", "a", None, "温柔型").await.is_ok());
    }
}
