//! UseCase: 音声質問処理 (`POST /voice`)
//!
//! 音声を文字起こしし、その結果を AI プロバイダに質問します。
//! Admission は 1 回で、requests 1 / aiCalls 2 / spend = 文字起こし + 応答の見積もり。
//!
//! 失敗時の扱い:
//! - 文字起こしの失敗: 全額 refund
//! - 応答の失敗: 文字起こし分の費用だけを残して reconcile

use std::sync::Arc;

use consia_shared::time::Clock;
use serde_json::json;

use crate::{
    domain::{
        AiProvider, AuditEvent, AuditKind, AuthContext, Money, Pricing, ProviderError,
        SpeechProvider, Timestamp, UsageDelta,
    },
    infrastructure::AuditRecorder,
};

use super::{
    admission::{Admission, AdmissionController},
    error::AiUseCaseError,
    provider_call::{AiSettings, bounded},
};

/// Uploaded audio
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceAskOutcome {
    pub transcript: String,
    pub reply: String,
    pub model: String,
}

/// 音声質問のユースケース
pub struct VoiceAskUseCase {
    ai: Arc<dyn AiProvider>,
    speech: Arc<dyn SpeechProvider>,
    admission: Arc<AdmissionController>,
    pricing: Pricing,
    settings: AiSettings,
    audit: AuditRecorder,
    clock: Arc<dyn Clock>,
}

impl VoiceAskUseCase {
    pub fn new(
        ai: Arc<dyn AiProvider>,
        speech: Arc<dyn SpeechProvider>,
        admission: Arc<AdmissionController>,
        pricing: Pricing,
        settings: AiSettings,
        audit: AuditRecorder,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ai,
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
        audio: AudioUpload,
    ) -> Result<VoiceAskOutcome, AiUseCaseError> {
        if audio.bytes.is_empty() {
            return Err(AiUseCaseError::InvalidInput(
                "Missing audio file field 'file'".to_string(),
            ));
        }

        let transcription_cost = self.pricing.transcription_cost();
        let estimate = UsageDelta::request().with_ai_calls(2).with_spend(
            transcription_cost.saturating_add(self.pricing.completion_estimate()),
        );
        let admission = self.admission.try_admit(auth, estimate).await?;

        let transcript = match bounded(
            self.settings.timeout,
            self.speech
                .transcribe(audio.bytes, &audio.filename, &audio.content_type),
        )
        .await
        {
            Ok(transcript) => transcript,
            Err(e) => {
                if let Err(refund_error) = self.admission.refund(&admission).await {
                    tracing::error!("Failed to refund admission: {}", refund_error);
                }
                return Err(self.provider_failed(auth, "transcribe", e));
            }
        };

        let completion = match bounded(
            self.settings.timeout,
            self.ai.complete(
                &self.settings.system_prompt,
                &transcript,
                &self.settings.chat_model,
            ),
        )
        .await
        {
            Ok(completion) => completion,
            Err(e) => {
                self.settle(&admission, transcription_cost).await;
                return Err(self.provider_failed(auth, "voice_ask", e));
            }
        };

        let cost = transcription_cost
            .saturating_add(self.pricing.completion_cost(completion.tokens));
        self.settle(&admission, cost).await;
        self.audit.record(AuditEvent::new(
            Timestamp::new(self.clock.now_millis()),
            AuditKind::VoiceAsk,
            auth.identity.key(),
            json!({
                "model": completion.model,
                "tokens": completion.tokens,
                "transcript_chars": transcript.chars().count(),
                "spend": cost,
            }),
        ));

        Ok(VoiceAskOutcome {
            transcript,
            reply: completion.text,
            model: completion.model,
        })
    }

    async fn settle(&self, admission: &Admission, cost: Money) {
        if let Err(e) = self.admission.reconcile(admission, cost).await {
            tracing::error!("Failed to reconcile spend: {}", e);
        }
    }

    fn provider_failed(
        &self,
        auth: &AuthContext,
        operation: &str,
        error: ProviderError,
    ) -> AiUseCaseError {
        tracing::warn!(identity = %auth.identity, operation, "Provider call failed: {}", error);
        self.audit.record(AuditEvent::new(
            Timestamp::new(self.clock.now_millis()),
            AuditKind::ProviderFailed,
            auth.identity.key(),
            json!({ "operation": operation, "error": error.to_string() }),
        ));
        error.into()
    }
}
