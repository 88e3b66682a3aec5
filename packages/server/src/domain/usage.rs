//! Usage records and the deltas charged against them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{plan::PlanTier, value_object::Money};

/// Key of one usage record: (identity, calendar day, plan tier)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UsageKey {
    pub identity: String,
    pub day: String,
    pub plan: PlanTier,
}

impl UsageKey {
    pub fn new(identity: impl Into<String>, day: impl Into<String>, plan: PlanTier) -> Self {
        Self {
            identity: identity.into(),
            day: day.into(),
            plan,
        }
    }

    /// Store key. The day comes first so a whole day can be listed by prefix.
    pub fn storage_key(&self) -> String {
        format!("{}{}:{}", Self::day_prefix(&self.day), self.plan, self.identity)
    }

    /// Inverse of [`Self::storage_key`]
    pub fn from_storage_key(storage_key: &str) -> Option<Self> {
        let rest = storage_key.strip_prefix("usage:")?;
        let (day, rest) = rest.split_once(':')?;
        let (plan, identity) = rest.split_once(':')?;
        Some(Self::new(identity, day, plan.parse().ok()?))
    }

    pub fn day_prefix(day: &str) -> String {
        format!("usage:{day}:")
    }

    /// Store key of the aggregate spend across every identity for a day
    pub fn global_budget_key(day: &str) -> String {
        format!("budget:{day}")
    }
}

/// Counter addressed by an `Increment`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageField {
    Requests,
    AiCalls,
    VoiceSessions,
    TtsChars,
    /// Spend in micro-units
    Spend,
}

/// Per (identity, day, plan) counters. Absent records read as all zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageRecord {
    pub requests: u64,
    pub ai_calls: u64,
    pub voice_sessions: u64,
    pub tts_chars: u64,
    pub spend: Money,
}

impl UsageRecord {
    pub fn get(&self, field: UsageField) -> i64 {
        match field {
            UsageField::Requests => self.requests as i64,
            UsageField::AiCalls => self.ai_calls as i64,
            UsageField::VoiceSessions => self.voice_sessions as i64,
            UsageField::TtsChars => self.tts_chars as i64,
            UsageField::Spend => self.spend.micros(),
        }
    }

    /// Add `delta` to one counter (saturating, never below zero) and return the new total
    pub fn increment(&mut self, field: UsageField, delta: i64) -> i64 {
        fn bump(value: &mut u64, delta: i64) {
            *value = if delta >= 0 {
                value.saturating_add(delta as u64)
            } else {
                value.saturating_sub(delta.unsigned_abs())
            };
        }
        match field {
            UsageField::Requests => bump(&mut self.requests, delta),
            UsageField::AiCalls => bump(&mut self.ai_calls, delta),
            UsageField::VoiceSessions => bump(&mut self.voice_sessions, delta),
            UsageField::TtsChars => bump(&mut self.tts_chars, delta),
            UsageField::Spend => {
                self.spend = self
                    .spend
                    .saturating_add(Money::from_micros(delta))
                    .non_negative()
            }
        }
        self.get(field)
    }

    /// Record after charging `delta`
    pub fn apply(&self, delta: &UsageDelta) -> UsageRecord {
        UsageRecord {
            requests: self.requests.saturating_add(delta.requests),
            ai_calls: self.ai_calls.saturating_add(delta.ai_calls),
            voice_sessions: self.voice_sessions.saturating_add(delta.voice_sessions),
            tts_chars: self.tts_chars.saturating_add(delta.tts_chars),
            spend: self.spend.saturating_add(delta.spend).non_negative(),
        }
    }

    /// Field-wise sum, used for aggregate metrics
    pub fn merge(&self, other: &UsageRecord) -> UsageRecord {
        UsageRecord {
            requests: self.requests.saturating_add(other.requests),
            ai_calls: self.ai_calls.saturating_add(other.ai_calls),
            voice_sessions: self.voice_sessions.saturating_add(other.voice_sessions),
            tts_chars: self.tts_chars.saturating_add(other.tts_chars),
            spend: self.spend.saturating_add(other.spend),
        }
    }
}

/// Amounts an operation asks to charge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageDelta {
    pub requests: u64,
    pub ai_calls: u64,
    pub voice_sessions: u64,
    pub tts_chars: u64,
    pub spend: Money,
}

impl UsageDelta {
    pub fn request() -> Self {
        Self {
            requests: 1,
            ..Self::default()
        }
    }

    pub fn with_ai_calls(mut self, calls: u64) -> Self {
        self.ai_calls = calls;
        self
    }

    pub fn with_voice_sessions(mut self, sessions: u64) -> Self {
        self.voice_sessions = sessions;
        self
    }

    pub fn with_tts_chars(mut self, chars: u64) -> Self {
        self.tts_chars = chars;
        self
    }

    pub fn with_spend(mut self, spend: Money) -> Self {
        self.spend = spend;
        self
    }

    /// Whether the operation consumes a paid resource
    pub fn is_paid(&self) -> bool {
        self.ai_calls > 0 || self.voice_sessions > 0 || self.tts_chars > 0 || self.spend.is_positive()
    }
}

/// Dimension that caused an admission rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    Requests,
    AiCalls,
    VoiceSessions,
    TtsChars,
    Spend,
    GlobalBudget,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Requests => "requests",
            Dimension::AiCalls => "aiCalls",
            Dimension::VoiceSessions => "voiceSessions",
            Dimension::TtsChars => "ttsChars",
            Dimension::Spend => "spend",
            Dimension::GlobalBudget => "globalBudget",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_groups_by_day() {
        // テスト項目: ストレージキーは日付プレフィックスで列挙できる形になる
        // given (前提条件):
        let key = UsageKey::new("device:kiosk", "2024-05-01", PlanTier::Pro);

        // when (操作):
        let storage_key = key.storage_key();

        // then (期待する結果):
        assert_eq!(storage_key, "usage:2024-05-01:PRO:device:kiosk");
        assert!(storage_key.starts_with(&UsageKey::day_prefix("2024-05-01")));
    }

    #[test]
    fn test_storage_key_parses_back() {
        // テスト項目: コロンを含む identity でもストレージキーから復元できる
        // given (前提条件):
        let key = UsageKey::new("service:billing", "2024-05-01", PlanTier::Business);

        // when (操作):
        let parsed = UsageKey::from_storage_key(&key.storage_key());

        // then (期待する結果):
        assert_eq!(parsed, Some(key));
        assert_eq!(UsageKey::from_storage_key("budget:2024-05-01"), None);
    }

    #[test]
    fn test_increment_returns_new_total_and_never_goes_negative() {
        // テスト項目: increment は新しい合計を返し、負の値にはならない
        // given (前提条件):
        let mut record = UsageRecord::default();

        // when (操作):
        let after_add = record.increment(UsageField::Requests, 3);
        let after_sub = record.increment(UsageField::Requests, -10);
        let spend = record.increment(UsageField::Spend, -1);

        // then (期待する結果):
        assert_eq!(after_add, 3);
        assert_eq!(after_sub, 0);
        assert_eq!(spend, 0);
    }

    #[test]
    fn test_apply_adds_every_dimension() {
        // テスト項目: apply で全ての次元が加算される
        // given (前提条件):
        let record = UsageRecord {
            requests: 1,
            ai_calls: 1,
            voice_sessions: 0,
            tts_chars: 10,
            spend: Money::from_units(0.5),
        };
        let delta = UsageDelta::request()
            .with_ai_calls(2)
            .with_tts_chars(5)
            .with_spend(Money::from_units(0.25));

        // when (操作):
        let next = record.apply(&delta);

        // then (期待する結果):
        assert_eq!(next.requests, 2);
        assert_eq!(next.ai_calls, 3);
        assert_eq!(next.tts_chars, 15);
        assert_eq!(next.spend, Money::from_units(0.75));
    }

    #[test]
    fn test_dimension_wire_names() {
        // テスト項目: Dimension の JSON 表現が camelCase になる
        // given (前提条件):
        let dimension = Dimension::GlobalBudget;

        // when (操作):
        let json = serde_json::to_string(&dimension).unwrap();

        // then (期待する結果):
        assert_eq!(json, "\"globalBudget\"");
        assert_eq!(Dimension::AiCalls.as_str(), "aiCalls");
    }
}
