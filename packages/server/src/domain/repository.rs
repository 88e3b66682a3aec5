//! Storage ports.
//!
//! Usage ledger, audit log and presence snapshots all persist through
//! [`KeyValueStore`]; the core never reaches for a process-wide global.

use std::time::Duration;

use async_trait::async_trait;

use super::{
    audit::{AuditEntry, AuditEvent},
    error::{AuditError, StoreError},
};

/// Pluggable key-value store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value`; with `ttl` the key expires after that duration
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Keys starting with `prefix`, sorted
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Atomically write `value` only when `key` is absent or expired.
    /// Returns whether the write happened.
    async fn put_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Atomically delete `key` only while it still holds `expected`
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError>;
}

/// Append-only, hash-chained event history
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Chain `event` onto the head and return its sequence number
    async fn append(&self, event: AuditEvent) -> Result<u64, AuditError>;

    /// Latest `n` entries, oldest first
    async fn recent(&self, n: usize) -> Result<Vec<AuditEntry>, AuditError>;

    /// Every retained entry, oldest first
    async fn entries(&self) -> Result<Vec<AuditEntry>, AuditError>;
}
