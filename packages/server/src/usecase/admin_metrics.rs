//! UseCase: 管理者向けメトリクスと監査ログ検証
//!
//! - `GET /admin/metrics`: 当日の Usage Ledger 集計と直近の監査ログ
//! - `GET /admin/audit/verify`: 保持中の監査ログのハッシュチェーンを再計算

use std::sync::Arc;

use consia_shared::time::{Clock, day_stamp};

use crate::{
    domain::{AuditEntry, AuditLog, Money, UsageKey, UsageRecord, verify_chain},
    infrastructure::UsageLedger,
};

use super::error::AdminError;

/// Usage of one day, as seen by the owner
#[derive(Debug, Clone)]
pub struct MetricsReport {
    pub day: String,
    /// One row per (identity, plan), sorted by identity
    pub rows: Vec<(UsageKey, UsageRecord)>,
    /// Sum of every row
    pub totals: UsageRecord,
    pub global_spend: Money,
    pub global_budget: Option<Money>,
    /// Oldest first, ending at the newest entry
    pub recent_audit: Vec<AuditEntry>,
}

/// Outcome of replaying the retained audit chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditVerification {
    pub verified: bool,
    pub entries: usize,
    pub error: Option<String>,
}

pub struct AdminMetricsUseCase {
    ledger: Arc<UsageLedger>,
    audit_log: Arc<dyn AuditLog>,
    global_budget: Option<Money>,
    recent_audit_len: usize,
    clock: Arc<dyn Clock>,
}

impl AdminMetricsUseCase {
    pub fn new(
        ledger: Arc<UsageLedger>,
        audit_log: Arc<dyn AuditLog>,
        global_budget: Option<Money>,
        recent_audit_len: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            audit_log,
            global_budget,
            recent_audit_len,
            clock,
        }
    }

    pub async fn metrics(&self) -> Result<MetricsReport, AdminError> {
        let day = day_stamp(self.clock.now_millis());

        let mut rows = self.ledger.records_for_day(&day).await?;
        rows.sort_by(|(a, _), (b, _)| {
            a.identity
                .cmp(&b.identity)
                .then_with(|| a.plan.as_str().cmp(b.plan.as_str()))
        });
        let totals = rows
            .iter()
            .fold(UsageRecord::default(), |acc, (_, record)| acc.merge(record));
        let global_spend = self.ledger.global_spend(&day).await?;
        let recent_audit = self.audit_log.recent(self.recent_audit_len).await?;

        Ok(MetricsReport {
            day,
            rows,
            totals,
            global_spend,
            global_budget: self.global_budget,
            recent_audit,
        })
    }

    pub async fn verify_audit(&self) -> Result<AuditVerification, AdminError> {
        let entries = self.audit_log.entries().await?;
        let verification = match verify_chain(&entries) {
            Ok(count) => AuditVerification {
                verified: true,
                entries: count,
                error: None,
            },
            Err(e) => {
                tracing::warn!("Audit chain verification failed: {}", e);
                AuditVerification {
                    verified: false,
                    entries: entries.len(),
                    error: Some(e.to_string()),
                }
            }
        };
        Ok(verification)
    }
}
