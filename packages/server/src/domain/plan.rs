//! Plan tiers, the plan limit table and the admission rule.

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::{
    error::ValueObjectError,
    usage::{Dimension, UsageDelta, UsageRecord},
    value_object::Money,
};

/// Named usage-limit profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
    Business,
    Enterprise,
}

impl PlanTier {
    pub const ALL: [PlanTier; 4] = [
        PlanTier::Free,
        PlanTier::Pro,
        PlanTier::Business,
        PlanTier::Enterprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "FREE",
            PlanTier::Pro => "PRO",
            PlanTier::Business => "BUSINESS",
            PlanTier::Enterprise => "ENTERPRISE",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = ValueObjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => Ok(PlanTier::Free),
            "PRO" => Ok(PlanTier::Pro),
            "BUSINESS" => Ok(PlanTier::Business),
            "ENTERPRISE" => Ok(PlanTier::Enterprise),
            _ => Err(ValueObjectError::UnknownPlanTier(s.to_string())),
        }
    }
}

/// Daily limits of one plan. `None` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlanLimits {
    pub max_requests: Option<u64>,
    pub max_ai_calls: Option<u64>,
    pub max_voice_sessions: Option<u64>,
    pub max_tts_chars: Option<u64>,
    /// Daily spend cap in currency units
    pub max_spend: Option<f64>,
}

impl PlanLimits {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn spend_limit(&self) -> Option<Money> {
        self.max_spend.map(Money::from_units)
    }
}

/// Immutable mapping from plan tier to its limits
#[derive(Debug, Clone, PartialEq)]
pub struct PlanLimitTable {
    limits: HashMap<PlanTier, PlanLimits>,
}

impl PlanLimitTable {
    pub fn new(limits: HashMap<PlanTier, PlanLimits>) -> Self {
        Self { limits }
    }

    /// Limits for `tier`. A tier missing from the table is unlimited.
    pub fn limits_for(&self, tier: PlanTier) -> PlanLimits {
        self.limits.get(&tier).cloned().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PlanTier, &PlanLimits)> {
        self.limits.iter()
    }
}

impl Default for PlanLimitTable {
    fn default() -> Self {
        let limits = HashMap::from([
            (
                PlanTier::Free,
                PlanLimits {
                    max_requests: Some(100),
                    max_ai_calls: Some(50),
                    max_voice_sessions: Some(5),
                    max_tts_chars: Some(10_000),
                    max_spend: Some(0.5),
                },
            ),
            (
                PlanTier::Pro,
                PlanLimits {
                    max_requests: Some(2_000),
                    max_ai_calls: Some(1_000),
                    max_voice_sessions: Some(100),
                    max_tts_chars: Some(200_000),
                    max_spend: Some(10.0),
                },
            ),
            (
                PlanTier::Business,
                PlanLimits {
                    max_requests: Some(20_000),
                    max_ai_calls: Some(10_000),
                    max_voice_sessions: Some(1_000),
                    max_tts_chars: Some(2_000_000),
                    max_spend: Some(100.0),
                },
            ),
            (PlanTier::Enterprise, PlanLimits::unlimited()),
        ]);
        Self { limits }
    }
}

/// Decide whether charging `delta` keeps usage within the limits.
///
/// The global budget is checked first and wins over any per-identity
/// dimension. A dimension is only checked when the delta touches it; spend
/// is checked for every paid operation, so usage already pushed past the cap
/// by reconciliation blocks the next paid call even with a zero estimate.
pub fn evaluate_admission(
    current: &UsageRecord,
    delta: &UsageDelta,
    limits: &PlanLimits,
    global_spent: Money,
    global_cap: Option<Money>,
) -> Result<(), Dimension> {
    if let Some(cap) = global_cap
        && delta.is_paid()
        && global_spent.saturating_add(delta.spend) > cap
    {
        return Err(Dimension::GlobalBudget);
    }

    let projected = current.apply(delta);
    let counters = [
        (delta.requests, projected.requests, limits.max_requests, Dimension::Requests),
        (delta.ai_calls, projected.ai_calls, limits.max_ai_calls, Dimension::AiCalls),
        (
            delta.voice_sessions,
            projected.voice_sessions,
            limits.max_voice_sessions,
            Dimension::VoiceSessions,
        ),
        (delta.tts_chars, projected.tts_chars, limits.max_tts_chars, Dimension::TtsChars),
    ];
    for (requested, total, limit, dimension) in counters {
        if requested > 0
            && let Some(limit) = limit
            && total > limit
        {
            return Err(dimension);
        }
    }

    if let Some(cap) = limits.spend_limit()
        && delta.is_paid()
        && projected.spend > cap
    {
        return Err(Dimension::Spend);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_limits() -> PlanLimits {
        PlanLimits {
            max_requests: Some(100),
            max_ai_calls: Some(2),
            max_voice_sessions: None,
            max_tts_chars: Some(10),
            max_spend: Some(1.0),
        }
    }

    #[test]
    fn test_plan_tier_parses_case_insensitively() {
        // テスト項目: プラン名は大文字小文字を区別せずに解釈される
        // given (前提条件):

        // when (操作):
        let pro: PlanTier = "pro".parse().unwrap();
        let unknown = "gold".parse::<PlanTier>();

        // then (期待する結果):
        assert_eq!(pro, PlanTier::Pro);
        assert_eq!(
            unknown,
            Err(ValueObjectError::UnknownPlanTier("gold".to_string()))
        );
    }

    #[test]
    fn test_request_limit_boundary() {
        // テスト項目: 上限ちょうどまでは許可され、超えると requests で拒否される
        // given (前提条件):
        let limits = free_limits();
        let at_99 = UsageRecord {
            requests: 99,
            ..UsageRecord::default()
        };
        let at_100 = UsageRecord {
            requests: 100,
            ..UsageRecord::default()
        };

        // when (操作):
        let hundredth = evaluate_admission(&at_99, &UsageDelta::request(), &limits, Money::ZERO, None);
        let hundred_first =
            evaluate_admission(&at_100, &UsageDelta::request(), &limits, Money::ZERO, None);

        // then (期待する結果):
        assert_eq!(hundredth, Ok(()));
        assert_eq!(hundred_first, Err(Dimension::Requests));
    }

    #[test]
    fn test_untouched_dimension_is_not_checked() {
        // テスト項目: delta が 0 の次元は上限超過でも判定対象にならない
        // given (前提条件):
        let limits = free_limits();
        let current = UsageRecord {
            tts_chars: 50,
            ..UsageRecord::default()
        };

        // when (操作):
        let result = evaluate_admission(
            &current,
            &UsageDelta::request().with_ai_calls(1),
            &limits,
            Money::ZERO,
            None,
        );

        // then (期待する結果):
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_spend_over_cap_blocks_next_paid_call() {
        // テスト項目: 事後精算で上限を超えた後は、見積り 0 の有料呼び出しも拒否される
        // given (前提条件):
        let limits = free_limits();
        let current = UsageRecord {
            spend: Money::from_units(1.2),
            ..UsageRecord::default()
        };

        // when (操作):
        let paid = evaluate_admission(
            &current,
            &UsageDelta::request().with_ai_calls(1),
            &PlanLimits {
                max_ai_calls: None,
                ..limits.clone()
            },
            Money::ZERO,
            None,
        );
        let free = evaluate_admission(&current, &UsageDelta::request(), &limits, Money::ZERO, None);

        // then (期待する結果):
        assert_eq!(paid, Err(Dimension::Spend));
        assert_eq!(free, Ok(()));
    }

    #[test]
    fn test_global_budget_wins_over_identity_dimensions() {
        // テスト項目: グローバル予算超過は個別の次元より優先して報告される
        // given (前提条件):
        let limits = free_limits();
        let current = UsageRecord {
            ai_calls: 2,
            ..UsageRecord::default()
        };
        let delta = UsageDelta::request()
            .with_ai_calls(1)
            .with_spend(Money::from_units(0.1));

        // when (操作):
        let result = evaluate_admission(
            &current,
            &delta,
            &limits,
            Money::from_units(5.0),
            Some(Money::from_units(5.0)),
        );

        // then (期待する結果):
        assert_eq!(result, Err(Dimension::GlobalBudget));
    }

    #[test]
    fn test_missing_tier_is_unlimited() {
        // テスト項目: テーブルに無いプランは無制限として扱われる
        // given (前提条件):
        let table = PlanLimitTable::new(HashMap::new());

        // when (操作):
        let limits = table.limits_for(PlanTier::Business);

        // then (期待する結果):
        assert_eq!(limits, PlanLimits::unlimited());
    }
}
