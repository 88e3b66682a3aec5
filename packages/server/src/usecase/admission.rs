//! UseCase: Admission Controller
//!
//! 有料操作・ルーム操作の前に、identity のプランと全体の日次予算を照合し、
//! 許可した場合だけ使用量を記録します（ソフトロック）。
//!
//! ## 処理の流れ
//!
//! 1. (identity, 今日, プラン) のキーのロックを取得し、有料操作なら全体予算キーのロックも取得
//!    （ロックはストア上にあり、同じストアを共有する全インスタンスで排他）
//! 2. 現在の使用量を読み、加算後の値を上限と比較
//! 3. 超過なら何も書き込まずに `Rejected(dimension)`
//! 4. 通過なら両方のレコードを書き込んでから `Admission` を返す
//!
//! 事前見積もりで許可した後、実際の費用で `reconcile` します。
//! reconcile の結果として上限を超えることがありますが、その呼び出しは成功のまま扱い、
//! 次の有料操作が拒否されます。

use std::sync::Arc;

use consia_shared::time::{Clock, day_stamp};
use serde_json::json;

use crate::{
    domain::{
        AuditEvent, AuditKind, AuthContext, Money, PlanLimitTable, Timestamp, UsageDelta,
        UsageField, UsageKey, UsageRecord, evaluate_admission,
    },
    infrastructure::{AuditRecorder, LedgerError, UsageLedger},
};

use super::error::AdmissionError;

/// Proof that an operation was admitted, and what it was charged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub key: UsageKey,
    pub charged: UsageDelta,
}

/// Admission Controller
pub struct AdmissionController {
    ledger: Arc<UsageLedger>,
    plans: PlanLimitTable,
    /// Aggregate daily spend cap across every identity
    global_budget: Option<Money>,
    clock: Arc<dyn Clock>,
    audit: AuditRecorder,
}

impl AdmissionController {
    pub fn new(
        ledger: Arc<UsageLedger>,
        plans: PlanLimitTable,
        global_budget: Option<Money>,
        clock: Arc<dyn Clock>,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            ledger,
            plans,
            global_budget,
            clock,
            audit,
        }
    }

    pub fn global_budget(&self) -> Option<Money> {
        self.global_budget
    }

    fn today(&self) -> String {
        day_stamp(self.clock.now_millis())
    }

    /// Admit `delta` for the caller or reject it without charging anything
    pub async fn try_admit(
        &self,
        auth: &AuthContext,
        delta: UsageDelta,
    ) -> Result<Admission, AdmissionError> {
        let key = UsageKey::new(auth.identity.key(), self.today(), auth.plan);
        let storage_key = key.storage_key();
        let global_key = UsageKey::global_budget_key(&key.day);

        let identity_lock = self.ledger.lock(&storage_key).await?;
        let global_lock = if delta.is_paid() {
            match self.ledger.lock(&global_key).await {
                Ok(lock) => Some(lock),
                Err(e) => {
                    identity_lock.release().await;
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        let outcome = self
            .admit_locked(auth, &storage_key, &global_key, &delta)
            .await;

        if let Some(lock) = global_lock {
            lock.release().await;
        }
        identity_lock.release().await;
        outcome?;

        tracing::debug!(
            identity = %auth.identity,
            plan = %auth.plan,
            spend = %delta.spend,
            "Admitted"
        );
        Ok(Admission {
            key,
            charged: delta,
        })
    }

    /// Evaluate and charge `delta`. The caller holds the identity lock, and the
    /// global budget lock when `delta` is paid.
    async fn admit_locked(
        &self,
        auth: &AuthContext,
        storage_key: &str,
        global_key: &str,
        delta: &UsageDelta,
    ) -> Result<(), AdmissionError> {
        let current = self.ledger.read(storage_key).await?.unwrap_or_default();
        let global = self.ledger.read(global_key).await?.unwrap_or_default();
        let limits = self.plans.limits_for(auth.plan);

        if let Err(dimension) =
            evaluate_admission(&current, delta, &limits, global.spend, self.global_budget)
        {
            tracing::info!(
                identity = %auth.identity,
                plan = %auth.plan,
                dimension = %dimension,
                "Admission rejected"
            );
            self.audit.record(AuditEvent::new(
                Timestamp::new(self.clock.now_millis()),
                AuditKind::AdmissionRejected,
                auth.identity.key(),
                json!({ "dimension": dimension, "plan": auth.plan }),
            ));
            return Err(AdmissionError::Rejected(dimension));
        }

        self.ledger.write(storage_key, &current.apply(delta)).await?;
        if delta.spend.is_positive() {
            let next = UsageRecord {
                spend: global.spend.saturating_add(delta.spend),
                ..global
            };
            self.ledger.write(global_key, &next).await?;
        }
        Ok(())
    }

    /// Replace the pre-flight spend estimate with the actual cost.
    ///
    /// May leave committed spend above the cap; the next paid call is then rejected.
    pub async fn reconcile(&self, admission: &Admission, actual: Money) -> Result<(), LedgerError> {
        let difference = actual.saturating_sub(admission.charged.spend).micros();
        if difference == 0 {
            return Ok(());
        }
        self.adjust(admission, &[], difference).await
    }

    /// Give back what a failed operation was charged, except the request itself
    pub async fn refund(&self, admission: &Admission) -> Result<(), LedgerError> {
        let charged = &admission.charged;
        let counters = [
            (UsageField::AiCalls, charged.ai_calls),
            (UsageField::VoiceSessions, charged.voice_sessions),
            (UsageField::TtsChars, charged.tts_chars),
        ];
        let changes: Vec<(UsageField, i64)> = counters
            .into_iter()
            .filter(|(_, amount)| *amount > 0)
            .map(|(field, amount)| (field, -(amount as i64)))
            .collect();
        self.adjust(admission, &changes, -charged.spend.micros())
            .await
    }

    /// Apply counter changes and a spend change to the admitted record and the
    /// global budget record, under the same lock order as `try_admit`
    async fn adjust(
        &self,
        admission: &Admission,
        changes: &[(UsageField, i64)],
        spend_micros: i64,
    ) -> Result<(), LedgerError> {
        let storage_key = admission.key.storage_key();
        let global_key = UsageKey::global_budget_key(&admission.key.day);

        let identity_lock = self.ledger.lock(&storage_key).await?;
        let global_lock = match self.ledger.lock(&global_key).await {
            Ok(lock) => lock,
            Err(e) => {
                identity_lock.release().await;
                return Err(e);
            }
        };

        let result = async {
            let mut record = self.ledger.read(&storage_key).await?.unwrap_or_default();
            for (field, delta) in changes {
                record.increment(*field, *delta);
            }
            record.increment(UsageField::Spend, spend_micros);
            self.ledger.write(&storage_key, &record).await?;

            if spend_micros != 0 {
                let mut global = self.ledger.read(&global_key).await?.unwrap_or_default();
                global.increment(UsageField::Spend, spend_micros);
                self.ledger.write(&global_key, &global).await?;
            }
            Ok::<(), LedgerError>(())
        }
        .await;

        global_lock.release().await;
        identity_lock.release().await;
        result
    }
}
