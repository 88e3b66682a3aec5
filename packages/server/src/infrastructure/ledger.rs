//! Usage Ledger
//!
//! KeyValueStore 上に (identity, day, plan) 単位のカウンタを保持する。
//! 同じキーへの read-modify-write は必ずストア上のキー単位ロックを通して直列化され、
//! 同じストアを共有する複数のインスタンスの間でも更新が失われない。
//! 異なるキーの更新は並行に進む。

use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    domain::{KeyValueStore, Money, StoreError, UsageField, UsageKey, UsageRecord},
    infrastructure::store::{KeyLock, KeyLocks},
};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Usage Ledger
pub struct UsageLedger {
    store: Arc<dyn KeyValueStore>,
    /// Records expire after this window
    retention: Duration,
    locks: KeyLocks,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn KeyValueStore>, retention: Duration) -> Self {
        Self {
            locks: KeyLocks::new(store.clone()),
            store,
            retention,
        }
    }

    /// Take the single-writer lock of one storage key.
    ///
    /// Callers holding several locks must take the identity key before the
    /// global budget key.
    pub async fn lock(&self, storage_key: &str) -> Result<KeyLock, LedgerError> {
        Ok(self.locks.acquire(storage_key).await?)
    }

    /// Stored record, `None` when absent
    pub async fn get(&self, key: &UsageKey) -> Result<Option<UsageRecord>, LedgerError> {
        self.read(&key.storage_key()).await
    }

    /// Add `delta` to one counter and return the new total
    pub async fn increment(
        &self,
        key: &UsageKey,
        field: UsageField,
        delta: i64,
    ) -> Result<i64, LedgerError> {
        let storage_key = key.storage_key();
        let lock = self.lock(&storage_key).await?;
        let result = async {
            let mut record = self.read(&storage_key).await?.unwrap_or_default();
            let total = record.increment(field, delta);
            self.write(&storage_key, &record).await?;
            Ok::<i64, LedgerError>(total)
        }
        .await;
        lock.release().await;
        result
    }

    /// Aggregate spend across every identity for `day`
    pub async fn global_spend(&self, day: &str) -> Result<Money, LedgerError> {
        Ok(self
            .read(&UsageKey::global_budget_key(day))
            .await?
            .unwrap_or_default()
            .spend)
    }

    /// Every per-identity record stored for `day`
    pub async fn records_for_day(
        &self,
        day: &str,
    ) -> Result<Vec<(UsageKey, UsageRecord)>, LedgerError> {
        let keys = self.store.keys(&UsageKey::day_prefix(day)).await?;
        let mut records = Vec::with_capacity(keys.len());
        for storage_key in keys {
            let Some(key) = UsageKey::from_storage_key(&storage_key) else {
                tracing::warn!(storage_key = %storage_key, "Skipping malformed usage key");
                continue;
            };
            if let Some(record) = self.read(&storage_key).await? {
                records.push((key, record));
            }
        }
        Ok(records)
    }

    /// Read without locking. Only call while holding [`Self::lock`] for
    /// `storage_key` when the value feeds a write.
    pub(crate) async fn read(&self, storage_key: &str) -> Result<Option<UsageRecord>, LedgerError> {
        match self.store.get(storage_key).await? {
            Some(raw) => Ok(Some(
                serde_json::from_str(&raw).map_err(StoreError::from)?,
            )),
            None => Ok(None),
        }
    }

    /// Write without locking. The caller must hold [`Self::lock`] for `storage_key`.
    pub(crate) async fn write(
        &self,
        storage_key: &str,
        record: &UsageRecord,
    ) -> Result<(), LedgerError> {
        let raw = serde_json::to_string(record).map_err(StoreError::from)?;
        self.store
            .put(storage_key, raw, Some(self.retention))
            .await?;
        Ok(())
    }
}
