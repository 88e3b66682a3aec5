//! UseCase: テキスト質問処理 (`POST /ask`)
//!
//! ## 処理の流れ
//!
//! 1. メッセージの検証（空なら InvalidInput）
//! 2. Admission: requests 1 / aiCalls 1 / spend = 事前見積もり
//! 3. AI プロバイダ呼び出し（タイムアウト付き）
//! 4. 成功時: 実トークン数で reconcile、失敗時: refund
//! 5. 監査ログ記録（fire-and-forget）

use std::sync::Arc;

use consia_shared::time::Clock;
use serde_json::json;

use crate::{
    domain::{AiProvider, AuditEvent, AuditKind, AuthContext, Pricing, Timestamp, UsageDelta},
    infrastructure::AuditRecorder,
};

use super::{
    admission::AdmissionController,
    error::AiUseCaseError,
    provider_call::{AiSettings, bounded},
};

/// Answer of a completed question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskOutcome {
    pub message: String,
    pub reply: String,
    pub model: String,
    pub tokens: u64,
}

/// テキスト質問のユースケース
pub struct AskUseCase {
    provider: Arc<dyn AiProvider>,
    admission: Arc<AdmissionController>,
    pricing: Pricing,
    settings: AiSettings,
    audit: AuditRecorder,
    clock: Arc<dyn Clock>,
}

impl AskUseCase {
    pub fn new(
        provider: Arc<dyn AiProvider>,
        admission: Arc<AdmissionController>,
        pricing: Pricing,
        settings: AiSettings,
        audit: AuditRecorder,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
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
        message: Option<String>,
    ) -> Result<AskOutcome, AiUseCaseError> {
        let message = message.unwrap_or_default().trim().to_string();
        if message.is_empty() {
            return Err(AiUseCaseError::InvalidInput("Missing 'message'".to_string()));
        }

        let estimate = UsageDelta::request()
            .with_ai_calls(1)
            .with_spend(self.pricing.completion_estimate());
        let admission = self.admission.try_admit(auth, estimate).await?;

        let result = bounded(
            self.settings.timeout,
            self.provider
                .complete(&self.settings.system_prompt, &message, &self.settings.chat_model),
        )
        .await;
        let now = Timestamp::new(self.clock.now_millis());

        let completion = match result {
            Ok(completion) => completion,
            Err(e) => {
                tracing::warn!(identity = %auth.identity, "Completion failed: {}", e);
                if let Err(refund_error) = self.admission.refund(&admission).await {
                    tracing::error!("Failed to refund admission: {}", refund_error);
                }
                self.audit.record(AuditEvent::new(
                    now,
                    AuditKind::ProviderFailed,
                    auth.identity.key(),
                    json!({ "operation": "ask", "error": e.to_string() }),
                ));
                return Err(e.into());
            }
        };

        let cost = self.pricing.completion_cost(completion.tokens);
        if let Err(e) = self.admission.reconcile(&admission, cost).await {
            tracing::error!(identity = %auth.identity, "Failed to reconcile spend: {}", e);
        }
        self.audit.record(AuditEvent::new(
            now,
            AuditKind::AiCompletion,
            auth.identity.key(),
            json!({
                "model": completion.model,
                "tokens": completion.tokens,
                "spend": cost,
            }),
        ));

        Ok(AskOutcome {
            message,
            reply: completion.text,
            model: completion.model,
            tokens: completion.tokens,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        domain::{
            Completion, Dimension, Identity, MockAiProvider, Money, PlanLimitTable, PlanLimits,
            PlanTier, ProviderError, UsageKey,
        },
        infrastructure::{InMemoryStore, StoreAuditLog, UsageLedger},
    };
    use consia_shared::time::{FixedClock, day_stamp};
    use std::{collections::HashMap, time::Duration};

    pub(crate) const NOW: i64 = 1_714_521_600_000;

    pub(crate) struct Harness {
        pub admission: Arc<AdmissionController>,
        pub ledger: Arc<UsageLedger>,
        pub audit: AuditRecorder,
        pub log: Arc<StoreAuditLog>,
        pub clock: Arc<dyn Clock>,
    }

    impl Harness {
        pub(crate) fn new(plans: PlanLimitTable) -> Self {
            let store = Arc::new(InMemoryStore::new());
            let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(NOW));
            let log = Arc::new(StoreAuditLog::new(store.clone(), 100));
            let (audit, _handle) = AuditRecorder::spawn(log.clone());
            let ledger = Arc::new(UsageLedger::new(store, Duration::from_secs(3600)));
            let admission = Arc::new(AdmissionController::new(
                ledger.clone(),
                plans,
                None,
                clock.clone(),
                audit.clone(),
            ));
            Self {
                admission,
                ledger,
                audit,
                log,
                clock,
            }
        }

        pub(crate) async fn usage(&self, auth: &AuthContext) -> crate::domain::UsageRecord {
            let key = UsageKey::new(auth.identity.key(), day_stamp(NOW), auth.plan);
            self.ledger.get(&key).await.unwrap().unwrap_or_default()
        }
    }

    pub(crate) fn device() -> AuthContext {
        AuthContext::new(
            Identity::Device {
                id: "kiosk".to_string(),
            },
            PlanTier::Pro,
        )
    }

    fn pricing() -> Pricing {
        Pricing {
            per_1k_tokens: 0.002,
            completion_estimate: 0.01,
            ..Pricing::default()
        }
    }

    fn create_usecase(harness: &Harness, provider: MockAiProvider) -> AskUseCase {
        AskUseCase::new(
            Arc::new(provider),
            harness.admission.clone(),
            pricing(),
            AiSettings::default(),
            harness.audit.clone(),
            harness.clock.clone(),
        )
    }

    #[tokio::test]
    async fn test_ask_success_reconciles_spend() {
        // テスト項目: 成功時は返答を返し、実トークン数で費用が確定する
        // given (前提条件):
        let harness = Harness::new(PlanLimitTable::default());
        let mut provider = MockAiProvider::new();
        provider
            .expect_complete()
            .withf(|_, message, model| {
                message.to_string() == "hello" && model.to_string() == "gpt-4o-mini"
            })
            .times(1)
            .returning(|_, _, model| {
                Ok(Completion {
                    text: "hi there".to_string(),
                    model: model.to_string(),
                    tokens: 1_500,
                })
            });
        let usecase = create_usecase(&harness, provider);

        // when (操作):
        let outcome = usecase
            .execute(&device(), Some("  hello ".to_string()))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(outcome.message, "hello");
        assert_eq!(outcome.reply, "hi there");
        let usage = harness.usage(&device()).await;
        assert_eq!(usage.requests, 1);
        assert_eq!(usage.ai_calls, 1);
        assert_eq!(usage.spend, Money::from_micros(3_000));
    }

    #[tokio::test]
    async fn test_ask_missing_message_is_not_charged() {
        // テスト項目: メッセージが空なら InvalidInput で、使用量は増えない
        // given (前提条件):
        let harness = Harness::new(PlanLimitTable::default());
        let mut provider = MockAiProvider::new();
        provider.expect_complete().never();
        let usecase = create_usecase(&harness, provider);

        // when (操作):
        let missing = usecase.execute(&device(), None).await;
        let blank = usecase.execute(&device(), Some("   ".to_string())).await;

        // then (期待する結果):
        assert!(matches!(missing, Err(AiUseCaseError::InvalidInput(_))));
        assert!(matches!(blank, Err(AiUseCaseError::InvalidInput(_))));
        assert_eq!(harness.usage(&device()).await.requests, 0);
    }

    #[tokio::test]
    async fn test_ask_rejected_does_not_call_provider() {
        // テスト項目: 上限超過時はプロバイダを呼ばずに Rejected を返す
        // given (前提条件):
        let plans = PlanLimitTable::new(HashMap::from([(
            PlanTier::Pro,
            PlanLimits {
                max_ai_calls: Some(0),
                ..PlanLimits::unlimited()
            },
        )]));
        let harness = Harness::new(plans);
        let mut provider = MockAiProvider::new();
        provider.expect_complete().never();
        let usecase = create_usecase(&harness, provider);

        // when (操作):
        let result = usecase.execute(&device(), Some("hello".to_string())).await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(AiUseCaseError::Rejected(Dimension::AiCalls))
        ));
    }

    #[tokio::test]
    async fn test_ask_provider_failure_refunds() {
        // テスト項目: プロバイダ失敗時はエラーを返し、有料分が返金される
        // given (前提条件):
        let harness = Harness::new(PlanLimitTable::default());
        let mut provider = MockAiProvider::new();
        provider.expect_complete().returning(|_, _, _| {
            Err(ProviderError::Status {
                status: 500,
                detail: "upstream".to_string(),
            })
        });
        let usecase = create_usecase(&harness, provider);

        // when (操作):
        let result = usecase.execute(&device(), Some("hello".to_string())).await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(AiUseCaseError::Provider(ProviderError::Status { status: 500, .. }))
        ));
        let usage = harness.usage(&device()).await;
        assert_eq!(usage.requests, 1);
        assert_eq!(usage.ai_calls, 0);
        assert_eq!(usage.spend, Money::ZERO);
    }
}
