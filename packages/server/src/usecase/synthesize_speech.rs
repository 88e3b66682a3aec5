//! UseCase: 音声合成 (`POST /voice/tts`)
//!
//! Admission は入力文字数ぶんの ttsChars と、文字数に比例した費用。

use std::sync::Arc;

use consia_shared::time::Clock;
use serde_json::json;

use crate::{
    domain::{
        AudioClip, AuditEvent, AuditKind, AuthContext, Pricing, SpeechProvider, Timestamp,
        UsageDelta,
    },
    infrastructure::AuditRecorder,
};

use super::{
    admission::AdmissionController,
    error::AiUseCaseError,
    provider_call::{AiSettings, bounded},
    voice_session::non_blank,
};

/// Longest text accepted in one synthesis request, in characters
pub const MAX_TTS_INPUT_CHARS: usize = 4096;

/// 音声合成のユースケース
pub struct SynthesizeSpeechUseCase {
    speech: Arc<dyn SpeechProvider>,
    admission: Arc<AdmissionController>,
    pricing: Pricing,
    settings: AiSettings,
    audit: AuditRecorder,
    clock: Arc<dyn Clock>,
}

impl SynthesizeSpeechUseCase {
    pub fn new(
        speech: Arc<dyn SpeechProvider>,
        admission: Arc<AdmissionController>,
        pricing: Pricing,
        settings: AiSettings,
        audit: AuditRecorder,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            speech,
            admission,
            pricing,
            settings,
            audit,
            clock,
        }
    }

    pub async fn execute(
        &self,
        auth: &AuthContext,
        text: Option<String>,
        voice: Option<String>,
        format: Option<String>,
    ) -> Result<AudioClip, AiUseCaseError> {
        let Some(text) = non_blank(text) else {
            return Err(AiUseCaseError::InvalidInput("Missing 'text'".to_string()));
        };
        let chars = text.chars().count();
        if chars > MAX_TTS_INPUT_CHARS {
            return Err(AiUseCaseError::InvalidInput(format!(
                "'text' is longer than {MAX_TTS_INPUT_CHARS} characters"
            )));
        }
        let voice = non_blank(voice).unwrap_or_else(|| self.settings.voice.clone());
        let format = non_blank(format).unwrap_or_else(|| self.settings.tts_format.clone());

        let cost = self.pricing.tts_cost(chars as u64);
        let delta = UsageDelta::request()
            .with_tts_chars(chars as u64)
            .with_spend(cost);
        let admission = self.admission.try_admit(auth, delta).await?;

        let now = Timestamp::new(self.clock.now_millis());
        match bounded(
            self.settings.timeout,
            self.speech.synthesize(&text, &voice, &format),
        )
        .await
        {
            Ok(clip) => {
                self.audit.record(AuditEvent::new(
                    now,
                    AuditKind::SpeechSynthesis,
                    auth.identity.key(),
                    json!({ "chars": chars, "voice": voice, "format": format, "spend": cost }),
                ));
                Ok(clip)
            }
            Err(e) => {
                tracing::warn!(identity = %auth.identity, "Speech synthesis failed: {}", e);
                if let Err(refund_error) = self.admission.refund(&admission).await {
                    tracing::error!("Failed to refund admission: {}", refund_error);
                }
                self.audit.record(AuditEvent::new(
                    now,
                    AuditKind::ProviderFailed,
                    auth.identity.key(),
                    json!({ "operation": "tts", "error": e.to_string() }),
                ));
                Err(e.into())
            }
        }
    }
}
