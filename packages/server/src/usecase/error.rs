//! UseCase 層のエラー型

use thiserror::Error;

use crate::{
    domain::{AuditError, Dimension, ProviderError, RoomError, StoreError, ValueObjectError},
    infrastructure::LedgerError,
};

/// Admission Controller errors
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// A limit would be exceeded; nothing was charged
    #[error("limit exceeded on '{0}'")]
    Rejected(Dimension),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Room join errors
#[derive(Debug, Error)]
pub enum JoinRoomError {
    #[error("invalid room name: {0}")]
    InvalidRoomName(#[from] ValueObjectError),

    #[error("limit exceeded on '{0}'")]
    Rejected(Dimension),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Room(#[from] RoomError),
}

impl From<AdmissionError> for JoinRoomError {
    fn from(error: AdmissionError) -> Self {
        match error {
            AdmissionError::Rejected(dimension) => Self::Rejected(dimension),
            AdmissionError::Ledger(e) => Self::Ledger(e),
        }
    }
}

/// Room lookup errors
#[derive(Debug, Error)]
pub enum GetRoomDetailError {
    #[error("invalid room name: {0}")]
    InvalidRoomName(#[from] ValueObjectError),

    #[error("room '{0}' not found")]
    RoomNotFound(String),

    #[error("limit exceeded on '{0}'")]
    Rejected(Dimension),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<AdmissionError> for GetRoomDetailError {
    fn from(error: AdmissionError) -> Self {
        match error {
            AdmissionError::Rejected(dimension) => Self::Rejected(dimension),
            AdmissionError::Ledger(e) => Self::Ledger(e),
        }
    }
}

/// Errors of operations that call the AI or speech provider
#[derive(Debug, Error)]
pub enum AiUseCaseError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("limit exceeded on '{0}'")]
    Rejected(Dimension),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<AdmissionError> for AiUseCaseError {
    fn from(error: AdmissionError) -> Self {
        match error {
            AdmissionError::Rejected(dimension) => Self::Rejected(dimension),
            AdmissionError::Ledger(e) => Self::Ledger(e),
        }
    }
}

/// Admin read errors
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

/// Vault errors
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("invalid vault key")]
    InvalidKey,

    #[error("vault entry '{0}' not found")]
    NotFound(String),

    #[error("vault entry '{0}' is corrupted")]
    Corrupted(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
