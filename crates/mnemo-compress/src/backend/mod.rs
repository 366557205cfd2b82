//! Generative model backends
//!
//! The engine talks to a text-in/text-out model through [`GenerativeBackend`].
//! Transport is the backend's concern; the engine only sees a prompt going in
//! and either text or a [`BackendError`] coming out.

pub mod remote;

use std::time::Duration;

use async_trait::async_trait;

pub use remote::RemoteBackend;

/// Backend failures. All of them are recoverable by the fallback summarizer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("request timed out")]
    Timeout,
    #[error("API error: {0}")]
    Api(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty response")]
    EmptyResponse,
    #[error("configuration error: {0}")]
    Config(String),
}

/// Text-in/text-out generative model
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Generate a completion for `prompt`, giving up after `timeout`
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, BackendError>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
