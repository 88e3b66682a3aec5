//! Audit events and the hash chain that links them.
//!
//! `hash = SHA-256(domain tag || serialize(event) || prev_hash)`, hex encoded.
//! Tampering with any stored entry breaks verification from that entry on.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{
    error::{AuditError, ChainError},
    value_object::Timestamp,
};

/// Previous hash of the very first entry
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

const HASH_DOMAIN_TAG: &[u8] = b"consia-audit-v1";

/// Kind of security-relevant or billable event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    AuthFailed,
    AccessDenied,
    AdmissionRejected,
    AiCompletion,
    VoiceAsk,
    VoiceSession,
    SpeechSynthesis,
    ProviderFailed,
    RoomJoin,
    RoomLeave,
    VaultWrite,
    VaultDelete,
}

/// Event as submitted by callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: Timestamp,
    pub kind: AuditKind,
    pub subject: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        timestamp: Timestamp,
        kind: AuditKind,
        subject: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            timestamp,
            kind,
            subject: subject.into(),
            payload,
        }
    }
}

/// Stored, chained entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Sequence number, starting at 0 for the genesis entry
    pub id: u64,
    pub event: AuditEvent,
    pub prev_hash: String,
    pub hash: String,
}

/// Hash of `event` chained onto `prev_hash`
pub fn compute_entry_hash(event: &AuditEvent, prev_hash: &str) -> Result<String, AuditError> {
    let serialized = serde_json::to_vec(event)?;
    let mut hasher = Sha256::new();
    hasher.update(HASH_DOMAIN_TAG);
    hasher.update(&serialized);
    hasher.update(prev_hash.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Replay a contiguous run of entries and recompute every hash.
///
/// The run may start after retention trimming: its first `prev_hash` is then
/// taken as the anchor. A run starting at id 0 must anchor on [`GENESIS_HASH`].
/// Returns the number of verified entries.
pub fn verify_chain(entries: &[AuditEntry]) -> Result<usize, ChainError> {
    let Some(first) = entries.first() else {
        return Ok(0);
    };
    let mut expected_prev = if first.id == 0 {
        GENESIS_HASH.to_string()
    } else {
        first.prev_hash.clone()
    };
    let mut expected_id = first.id;

    for entry in entries {
        if entry.id != expected_id {
            return Err(ChainError::SequenceGap {
                id: entry.id,
                expected: expected_id,
            });
        }
        if entry.prev_hash != expected_prev {
            return Err(ChainError::BrokenLink { id: entry.id });
        }
        let recomputed = compute_entry_hash(&entry.event, &entry.prev_hash)
            .map_err(|_| ChainError::HashMismatch { id: entry.id })?;
        if recomputed != entry.hash {
            return Err(ChainError::HashMismatch { id: entry.id });
        }
        expected_prev = entry.hash.clone();
        expected_id += 1;
    }
    Ok(entries.len())
}
