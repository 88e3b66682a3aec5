//! Value objects.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ValueObjectError;

/// Default upper bound for room names, in characters.
pub const DEFAULT_ROOM_NAME_MAX_LEN: usize = 64;

/// Room used when a socket does not address one.
pub const DEFAULT_ROOM_NAME: &str = "global";

/// Name of a broadcast room (caller-supplied, length-capped)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    /// Create a room name with the default length cap
    pub fn new(name: String) -> Result<Self, ValueObjectError> {
        Self::with_max_len(name, DEFAULT_ROOM_NAME_MAX_LEN)
    }

    /// Create a room name capped at `max_len` characters
    pub fn with_max_len(name: String, max_len: usize) -> Result<Self, ValueObjectError> {
        if name.is_empty() {
            return Err(ValueObjectError::RoomNameEmpty);
        }
        let len = name.chars().count();
        if len > max_len {
            return Err(ValueObjectError::RoomNameTooLong { len, max: max_len });
        }
        if name.chars().any(char::is_control) {
            return Err(ValueObjectError::RoomNameInvalidCharacter);
        }
        Ok(Self(name))
    }

    pub fn global() -> Self {
        Self(DEFAULT_ROOM_NAME.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-unique id of one socket attached to a room
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Allocate a fresh id (UUID v4)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display identity of a room member.
///
/// Caller-supplied and never authenticated; only used for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityLabel(String);

impl IdentityLabel {
    pub const MAX_LEN: usize = 64;
    const FALLBACK: &'static str = "anonymous";

    /// Sanitize a raw label: trimmed, control characters dropped, capped at
    /// [`Self::MAX_LEN`] characters. Blank input becomes `anonymous`.
    pub fn from_raw(raw: Option<&str>) -> Self {
        let cleaned: String = raw
            .unwrap_or_default()
            .trim()
            .chars()
            .filter(|c| !c.is_control())
            .take(Self::MAX_LEN)
            .collect();
        if cleaned.is_empty() {
            Self(Self::FALLBACK.to_string())
        } else {
            Self(cleaned)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unix timestamp in UTC milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(millis: i64) -> Self {
        Self(millis)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

/// Currency amount stored as integer micro-units, so sums never drift.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    const MICROS_PER_UNIT: f64 = 1_000_000.0;

    pub const ZERO: Money = Money(0);

    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Convert a decimal amount in currency units, rounded to the nearest micro-unit
    pub fn from_units(units: f64) -> Self {
        if !units.is_finite() {
            return Self::ZERO;
        }
        Self((units * Self::MICROS_PER_UNIT).round() as i64)
    }

    pub fn micros(&self) -> i64 {
        self.0
    }

    pub fn as_units(&self) -> f64 {
        self.0 as f64 / Self::MICROS_PER_UNIT
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    /// Clamp at zero; recorded spend is never negative.
    pub fn non_negative(self) -> Money {
        Money(self.0.max(0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.as_units())
    }
}
