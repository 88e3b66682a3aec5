//! InMemory KeyValueStore 実装
//!
//! ドメイン層が定義する KeyValueStore trait の具体的な実装。
//! HashMap をインメモリ DB として使用し、TTL は読み出し時に評価します。

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use tokio::{sync::Mutex, time::Instant};

use crate::domain::{KeyValueStore, StoreError};

struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// インメモリ KeyValueStore 実装
#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 期限切れのキーを削除し、削除件数を返す
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, stored| stored.is_live(now));
        before - entries.len()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(stored) if stored.is_live(now) => Ok(Some(stored.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, stored)| key.starts_with(prefix) && stored.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|stored| stored.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            StoredValue {
                value,
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(stored) if stored.is_live(now) && stored.value == expected => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        // テスト項目: 書き込んだ値を読み出し、削除後は None になる
        // given (前提条件):
        let store = InMemoryStore::new();

        // when (操作):
        store.put("a", "1".to_string(), None).await.unwrap();
        let read = store.get("a").await.unwrap();
        store.delete("a").await.unwrap();
        let after_delete = store.get("a").await.unwrap();

        // then (期待する結果):
        assert_eq!(read, Some("1".to_string()));
        assert_eq!(after_delete, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expires_value() {
        // テスト項目: TTL を過ぎた値は読み出せず、列挙からも消える
        // given (前提条件):
        let store = InMemoryStore::new();
        store
            .put("usage:1", "x".to_string(), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        store.put("usage:2", "y".to_string(), None).await.unwrap();

        // when (操作):
        tokio::time::advance(Duration::from_secs(61)).await;

        // then (期待する結果):
        assert_eq!(store.get("usage:1").await.unwrap(), None);
        assert_eq!(store.keys("usage:").await.unwrap(), vec!["usage:2".to_string()]);
        assert_eq!(store.purge_expired().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_if_absent_respects_live_value_and_expiry() {
        // テスト項目: 有効な値があれば put_if_absent は書き込まず、期限切れ後は書き込める
        // given (前提条件):
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(5);
        assert!(store.put_if_absent("lock:a", "t1".to_string(), ttl).await.unwrap());

        // when (操作):
        let while_held = store.put_if_absent("lock:a", "t2".to_string(), ttl).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        let after_expiry = store.put_if_absent("lock:a", "t3".to_string(), ttl).await.unwrap();

        // then (期待する結果):
        assert!(!while_held);
        assert!(after_expiry);
        assert_eq!(store.get("lock:a").await.unwrap(), Some("t3".to_string()));
    }

    #[tokio::test]
    async fn test_delete_if_equals_only_removes_matching_value() {
        // テスト項目: delete_if_equals は値が一致するときだけ削除する
        // given (前提条件):
        let store = InMemoryStore::new();
        store.put("lock:a", "mine".to_string(), None).await.unwrap();

        // when (操作):
        let other = store.delete_if_equals("lock:a", "theirs").await.unwrap();
        let mine = store.delete_if_equals("lock:a", "mine").await.unwrap();

        // then (期待する結果):
        assert!(!other);
        assert!(mine);
        assert_eq!(store.get("lock:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_by_prefix_sorted() {
        // テスト項目: プレフィックスで絞り込んだキーがソートされて返る
        // given (前提条件):
        let store = InMemoryStore::new();
        for key in ["audit:2", "usage:b", "audit:1", "usage:a"] {
            store.put(key, String::new(), None).await.unwrap();
        }

        // when (操作):
        let keys = store.keys("audit:").await.unwrap();

        // then (期待する結果):
        assert_eq!(keys, vec!["audit:1".to_string(), "audit:2".to_string()]);
    }
}
