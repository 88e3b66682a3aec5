//! Domain layer.
//!
//! Value objects, entities and pure policy functions, plus the port traits
//! that the infrastructure layer implements (dependency inversion).

pub mod audit;
pub mod entity;
pub mod error;
pub mod identity;
pub mod plan;
pub mod pricing;
pub mod provider;
pub mod repository;
pub mod room_hub;
pub mod usage;
pub mod value_object;

pub use audit::{AuditEntry, AuditEvent, AuditKind, GENESIS_HASH, compute_entry_hash, verify_chain};
pub use entity::{Member, MemberInfo, RelayMode, Room, RoomSnapshot};
pub use error::{AuditError, ChainError, RoomError, StoreError, ValueObjectError};
pub use identity::{AuthContext, Identity};
pub use plan::{PlanLimitTable, PlanLimits, PlanTier, evaluate_admission};
pub use pricing::Pricing;
pub use provider::{
    AiProvider, AudioClip, Completion, EphemeralSession, ProviderError, SpeechProvider,
};
#[cfg(test)]
pub use provider::{MockAiProvider, MockSpeechProvider};
pub use repository::{AuditLog, KeyValueStore};
pub use room_hub::{ConnectionHandle, PusherChannel, RoomHub};
pub use usage::{Dimension, UsageDelta, UsageField, UsageKey, UsageRecord};
pub use value_object::{ConnectionId, IdentityLabel, Money, RoomName, Timestamp};
