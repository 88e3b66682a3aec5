//! Shared plumbing for use cases that call the AI or speech provider.

use std::{future::Future, time::Duration};

use crate::domain::ProviderError;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are CONSIA. Be concise, execution-first, and safety-first. \
If a request is ambiguous, make a best-effort assumption and proceed. \
Do not reveal secrets. Do not request sensitive personal data.";

/// Models and defaults used when calling providers
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub chat_model: String,
    pub realtime_model: String,
    pub voice: String,
    pub tts_format: String,
    pub system_prompt: String,
    /// Upper bound for one provider call
    pub timeout: Duration,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            chat_model: "gpt-4o-mini".to_string(),
            realtime_model: "gpt-4o-realtime-preview".to_string(),
            voice: "alloy".to_string(),
            tts_format: "mp3".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Await a provider call, giving up after `timeout`
pub(super) async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout),
    }
}
