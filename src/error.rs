//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("comms error: {0}")]
    Comms(String),

    #[error("memory error: {0}")]
    Memory(String),

    #[error("llm error: {0}")]
    Llm(String),

    #[error("speech error: {0}")]
    Speech(String),

    #[error("cron error: {0}")]
    Cron(String),

    #[error("knowledge base error: {0}")]
    Knowledge(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().starts_with("config error"));
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn memory_error_display() {
        let e = AppError::Memory("growth log unreadable".into());
        assert!(e.to_string().contains("growth log unreadable"));
    }

    #[test]
    fn speech_error_display() {
        let e = AppError::Speech("tts failed".into());
        assert_eq!(e.to_string(), "speech error: tts failed");
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }
}
