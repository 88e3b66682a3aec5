//! UseCase: リアルタイム音声セッションの発行 (`POST /voice/session`)
//!
//! 音声プロバイダから短命のセッション資格情報を取得します。
//! Admission は voiceSessions 1 と固定のセッション料金。失敗時は refund。

use std::sync::Arc;

use consia_shared::time::Clock;
use serde_json::json;

use crate::{
    domain::{
        AuditEvent, AuditKind, AuthContext, EphemeralSession, Pricing, SpeechProvider, Timestamp,
        UsageDelta,
    },
    infrastructure::AuditRecorder,
};

use super::{
    admission::AdmissionController,
    error::AiUseCaseError,
    provider_call::{AiSettings, bounded},
};

/// 音声セッション発行のユースケース
pub struct VoiceSessionUseCase {
    speech: Arc<dyn SpeechProvider>,
    admission: Arc<AdmissionController>,
    pricing: Pricing,
    settings: AiSettings,
    audit: AuditRecorder,
    clock: Arc<dyn Clock>,
}

impl VoiceSessionUseCase {
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

    /// `model` and `voice` fall back to the configured defaults
    pub async fn execute(
        &self,
        auth: &AuthContext,
        model: Option<String>,
        voice: Option<String>,
    ) -> Result<EphemeralSession, AiUseCaseError> {
        let model = non_blank(model).unwrap_or_else(|| self.settings.realtime_model.clone());
        let voice = non_blank(voice).unwrap_or_else(|| self.settings.voice.clone());

        let cost = self.pricing.voice_session_cost();
        let delta = UsageDelta::request().with_voice_sessions(1).with_spend(cost);
        let admission = self.admission.try_admit(auth, delta).await?;

        let now = Timestamp::new(self.clock.now_millis());
        match bounded(
            self.settings.timeout,
            self.speech.create_ephemeral_session(&model, &voice),
        )
        .await
        {
            Ok(session) => {
                self.audit.record(AuditEvent::new(
                    now,
                    AuditKind::VoiceSession,
                    auth.identity.key(),
                    json!({ "model": session.model, "voice": session.voice, "spend": cost }),
                ));
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(identity = %auth.identity, "Voice session failed: {}", e);
                if let Err(refund_error) = self.admission.refund(&admission).await {
                    tracing::error!("Failed to refund admission: {}", refund_error);
                }
                self.audit.record(AuditEvent::new(
                    now,
                    AuditKind::ProviderFailed,
                    auth.identity.key(),
                    json!({ "operation": "voice_session", "error": e.to_string() }),
                ));
                Err(e.into())
            }
        }
    }
}

pub(super) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
