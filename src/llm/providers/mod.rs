//! LLM provider implementations.
//!
//! `build(config, api_key)` is the factory, called at startup.
//! Adding a new backend = new module + new match arm.

pub mod dify;
pub mod dummy;

use crate::config::LlmConfig;
use crate::llm::{LlmProvider, ProviderError};

/// Construct a `LlmProvider` from config and an optional API key.
///
/// `api_key` is sourced from `DIFY_API_KEY` env (never TOML). The dummy
/// provider ignores it; the Dify provider refuses to start without one.
pub fn build(config: &LlmConfig, api_key: Option<String>) -> Result<LlmProvider, ProviderError> {
    match config.provider.as_str() {
        "dummy" => Ok(LlmProvider::Dummy(dummy::DummyProvider)),
        "dify" => {
            let key = api_key.ok_or_else(|| ProviderError::MissingApiKey("dify".into()))?;
            let d = &config.dify;
            let p = dify::DifyProvider::new(
                d.api_base_url.clone(),
                d.workflow_id.clone(),
                d.user.clone(),
                d.timeout_seconds,
                key,
            )?;
            Ok(LlmProvider::Dify(p))
        }
        _ => Err(ProviderError::UnknownProvider(config.provider.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn builds_dummy_without_key() {
        let cfg = Config::test_default(std::path::Path::new("/tmp"));
        let p = build(&cfg.llm, None).unwrap();
        assert_eq!(p.name(), "dummy");
    }

    #[test]
    fn dify_requires_key() {
        let mut cfg = Config::test_default(std::path::Path::new("/tmp"));
        cfg.llm.provider = "dify".into();
        assert!(matches!(build(&cfg.llm, None), Err(ProviderError::MissingApiKey(_))));
        let p = build(&cfg.llm, Some("app-test".into())).unwrap();
        assert_eq!(p.name(), "dify");
    }

    #[test]
    fn unknown_provider_errors() {
        let mut cfg = Config::test_default(std::path::Path::new("/tmp"));
        cfg.llm.provider = "gpt-local".into();
        match build(&cfg.llm, None) {
            Err(ProviderError::UnknownProvider(name)) => assert_eq!(name, "gpt-local"),
            other => panic!("expected unknown provider, got {other:?}"),
        }
    }
}
