//! Generative model clients for narrative extraction.

mod client;

pub use client::GeminiClient;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during model calls.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Failed to reach the provider at all.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Provider answered with an error status.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Provider response envelope could not be decoded.
    #[error("Response decode error: {0}")]
    Decode(String),

    /// No API key available.
    #[error("API key not configured")]
    MissingKey,
}

impl LlmError {
    /// Whether the retry loop should attempt this request again.
    ///
    /// Transport failures and provider-side errors are retryable; a missing
    /// key never fixes itself mid-run.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::MissingKey)
    }
}

/// Generation parameters carried by the active prompt version.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Seam between the pipeline and a concrete model provider.
///
/// Tests inject a scripted implementation; production uses [`GeminiClient`].
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Identifier recorded on extraction attempts.
    fn model_id(&self) -> &str;

    /// Issue one generation request and return the raw response text.
    async fn generate(&self, prompt: &str, params: &GenerationParams)
        -> Result<String, LlmError>;
}
