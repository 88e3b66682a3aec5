//! Domain error types.

use thiserror::Error;

/// Value object validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("room name must not be empty")]
    RoomNameEmpty,

    #[error("room name is too long ({len} > {max})")]
    RoomNameTooLong { len: usize, max: usize },

    #[error("room name contains control characters")]
    RoomNameInvalidCharacter,

    #[error("unknown plan tier '{0}'")]
    UnknownPlanTier(String),
}

/// Room hub errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("room '{room}' is full ({capacity} members)")]
    RoomFull { room: String, capacity: usize },

    #[error("room '{0}' is no longer accepting commands")]
    HubUnavailable(String),
}

/// Key-value store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("failed to encode or decode stored value: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("timed out waiting for lock '{0}'")]
    LockTimeout(String),
}

/// Audit log errors
#[derive(Debug, Error)]
pub enum AuditError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to serialize audit event: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Hash chain verification failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("entry {id}: previous hash does not link to the prior entry")]
    BrokenLink { id: u64 },

    #[error("entry {id}: stored hash does not match its content")]
    HashMismatch { id: u64 },

    #[error("entry {id}: expected sequence number {expected}")]
    SequenceGap { id: u64, expected: u64 },
}
