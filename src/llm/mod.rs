//! LLM workflow provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities; clone them freely.
//! The remote side is a hosted *workflow*, not a raw chat model: callers hand
//! over a bag of named prompt inputs and get the workflow's text output back.

pub mod providers;

use serde::Serialize;
use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider '{0}' requires DIFY_API_KEY")]
    MissingApiKey(String),
    #[error("provider request failed: {0}")]
    Request(String),
}

// ── Workflow inputs ───────────────────────────────────────────────────────────

/// Named inputs of one workflow run.
///
/// Field names are the workflow's input variable names and are serialized
/// as-is into the `inputs` object of the request body.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowInputs {
    pub user_input: String,
    pub conversation_history: String,
    pub style_prompt: String,
    pub growth_log: String,
    /// Compact `{"emotion":…,"style":…}` JSON, at most 48 chars.
    pub emotional_state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_profile: Option<serde_json::Value>,
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Enum dispatch avoids `dyn` trait objects and the `async-trait` dependency.
/// Adding a backend = new module + new variant + new `run_workflow` arm.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    Dify(providers::dify::DifyProvider),
}

impl LlmProvider {
    /// Run the workflow once and return its text reply.
    pub async fn run_workflow(&self, inputs: &WorkflowInputs) -> Result<String, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.run_workflow(inputs).await,
            LlmProvider::Dify(p) => p.run_workflow(inputs).await,
        }
    }

    /// Short provider name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Dummy(_) => "dummy",
            LlmProvider::Dify(_) => "dify",
        }
    }
}
