//! Dify workflow provider (`POST {base}/workflows/run`, blocking mode).
//!
//! All Dify wire types are private to this module; callers only see
//! [`WorkflowInputs`] going in and a reply string coming out.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::llm::{ProviderError, WorkflowInputs};

/// Adapter for a single published Dify workflow.
///
/// Constructed once at startup, then cheaply cloned because
/// `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct DifyProvider {
    client: Client,
    api_base_url: String,
    workflow_id: String,
    user: String,
    api_key: String,
}

impl DifyProvider {
    /// Build a provider from config values and the app API key.
    ///
    /// The key is sent as `Authorization: Bearer <key>` on every request.
    pub fn new(
        api_base_url: String,
        workflow_id: String,
        user: String,
        timeout_seconds: u64,
        api_key: String,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, api_base_url, workflow_id, user, api_key })
    }

    fn endpoint(&self) -> String {
        format!("{}/workflows/run", self.api_base_url)
    }

    /// Run the workflow once in blocking mode and return the unwrapped reply.
    pub async fn run_workflow(&self, inputs: &WorkflowInputs) -> Result<String, ProviderError> {
        let payload = WorkflowRunRequest {
            workflow_id: &self.workflow_id,
            inputs,
            response_mode: "blocking",
            user: &self.user,
        };

        debug!(
            workflow_id = %self.workflow_id,
            input_len = inputs.user_input.chars().count(),
            growth_log_len = inputs.growth_log.chars().count(),
            emotional_state = %inputs.emotional_state,
            "sending workflow run"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full workflow request payload");
        }

        let url = self.endpoint();
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(url = %url, error = %e, "workflow HTTP request failed (transport)");
                ProviderError::Request(e.to_string())
            })?;

        let response = check_status(response).await?;

        let parsed = response.json::<WorkflowRunResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize workflow response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        if let Some(status) = parsed.data.status.as_deref() {
            if status != "succeeded" {
                let detail = parsed.data.error.unwrap_or_default();
                error!(%status, %detail, "workflow run did not succeed");
                return Err(ProviderError::Request(format!("workflow {status}: {detail}")));
            }
        }

        let text = parsed
            .data
            .outputs
            .and_then(|o| o.text)
            .map(|t| unwrap_reply(&t))
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ProviderError::Request("empty or missing outputs.text".into()))?;

        debug!(reply_len = text.chars().count(), "received workflow reply");
        Ok(text)
    }
}

/// Some workflows wrap the reply as a JSON string in `outputs.text`.
/// Unwrap `{"answer": …}` or `{"text": …}`; any other text is returned as is.
pub fn unwrap_reply(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => {
            for key in ["answer", "text"] {
                if let Some(serde_json::Value::String(s)) = map.get(key) {
                    return s.clone();
                }
            }
            raw.to_string()
        }
        _ => raw.to_string(),
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WorkflowRunRequest<'a> {
    workflow_id: &'a str,
    inputs: &'a WorkflowInputs,
    response_mode: &'static str,
    user: &'a str,
}

#[derive(Debug, Deserialize)]
struct WorkflowRunResponse {
    data: RunData,
}

#[derive(Debug, Deserialize)]
struct RunData {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    outputs: Option<RunOutputs>,
}

#[derive(Debug, Deserialize)]
struct RunOutputs {
    #[serde(default)]
    text: Option<String>,
}

// Error envelope used by the Dify API.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

/// Consume the response and return it if successful, or a structured error.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let code = env.code.map(|c| format!(" [code={c}]")).unwrap_or_default();
        format!("HTTP {status}{code}: {}", env.message)
    } else {
        format!("HTTP {status}: {body}")
    };

    error!(%status, %message, "Dify request returned HTTP error");
    Err(ProviderError::Request(message))
}
