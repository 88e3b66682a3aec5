//! Infrastructure layer.
//!
//! Adapters behind the domain ports, plus wire DTOs.

pub mod audit_log;
pub mod dto;
pub mod idempotency;
pub mod ledger;
pub mod provider;
pub mod room_hub;
pub mod store;

pub use audit_log::{AuditRecorder, StoreAuditLog};
pub use idempotency::{IdempotencyCache, IdempotentOutcome};
pub use ledger::{LedgerError, UsageLedger};
pub use provider::{OpenAiClient, OpenAiSettings};
pub use room_hub::{ActorRoomHub, PresencePublisher, RoomHubSettings, presence_key};
pub use store::InMemoryStore;
