//! Price list used to turn provider usage into spend.

use serde::{Deserialize, Serialize};

use super::value_object::Money;

/// Per-unit prices, all in currency units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Pricing {
    pub per_1k_tokens: f64,
    /// Charged before a completion runs; reconciled with the real token count after
    pub completion_estimate: f64,
    pub per_voice_session: f64,
    pub per_1k_tts_chars: f64,
    pub per_transcription: f64,
}

impl Pricing {
    pub fn completion_cost(&self, tokens: u64) -> Money {
        Money::from_units(tokens as f64 / 1000.0 * self.per_1k_tokens)
    }

    pub fn completion_estimate(&self) -> Money {
        Money::from_units(self.completion_estimate)
    }

    pub fn voice_session_cost(&self) -> Money {
        Money::from_units(self.per_voice_session)
    }

    pub fn tts_cost(&self, chars: u64) -> Money {
        Money::from_units(chars as f64 / 1000.0 * self.per_1k_tts_chars)
    }

    pub fn transcription_cost(&self) -> Money {
        Money::from_units(self.per_transcription)
    }
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            per_1k_tokens: 0.002,
            completion_estimate: 0.01,
            per_voice_session: 0.05,
            per_1k_tts_chars: 0.015,
            per_transcription: 0.006,
        }
    }
}
