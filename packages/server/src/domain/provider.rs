//! External AI and speech provider ports.
//!
//! The gateway only depends on these traits; the OpenAI-compatible HTTP
//! client in `infrastructure::provider` is one implementation.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Provider failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Non-2xx answer; `detail` is the provider's own error body
    #[error("provider returned status {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider response could not be interpreted: {0}")]
    InvalidResponse(String),

    #[error("provider call timed out")]
    Timeout,

    #[error("provider is not configured: {0}")]
    NotConfigured(String),
}

/// Result of a text completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub text: String,
    pub model: String,
    /// Provider-reported token usage (input + output)
    pub tokens: u64,
}

/// Short-lived credential for a client-side realtime voice session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EphemeralSession {
    pub session_token: String,
    /// Unix seconds
    pub expires_at: i64,
    pub model: String,
    pub voice: String,
}

/// Synthesized audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        model: &str,
    ) -> Result<Completion, ProviderError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    async fn create_ephemeral_session(
        &self,
        model: &str,
        voice: &str,
    ) -> Result<EphemeralSession, ProviderError>;

    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        format: &str,
    ) -> Result<AudioClip, ProviderError>;

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<String, ProviderError>;
}
