//! Dummy workflow provider — echoes the user input back prefixed with `[echo]`.
//! Used for exercising the full context pipeline without a Dify instance.

use crate::llm::{ProviderError, WorkflowInputs};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn run_workflow(&self, inputs: &WorkflowInputs) -> Result<String, ProviderError> {
        Ok(format!("[echo] {}", inputs.user_input))
    }
}
