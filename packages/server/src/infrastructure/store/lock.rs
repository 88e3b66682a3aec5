//! ストアを介したキー単位の排他ロック
//!
//! ロックは `lock:{name}` というリースキーを `put_if_absent` で書き込むことで取得し、
//! 自分のトークンのときだけ `delete_if_equals` で解放します。同じストアを共有する
//! すべてのインスタンスの間で直列化されます。
//!
//! 同じプロセス内の待ち手はまずローカルの `Mutex` に並ぶので、ストアをポーリング
//! するのは 1 キーにつき各インスタンス 1 タスクだけです。

use std::{collections::HashMap, mem, sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, OwnedMutexGuard},
    time::Instant,
};
use uuid::Uuid;

use crate::domain::{KeyValueStore, StoreError};

/// A crashed holder's lease lapses after this long
const LEASE: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_millis(2);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(15);
/// ロック表がこの件数を超えたら未使用エントリを掃除する
const LOCK_TABLE_SWEEP_THRESHOLD: usize = 1024;

fn lease_key(name: &str) -> String {
    format!("lock:{name}")
}

/// Per-key locks shared through a [`KeyValueStore`]
pub struct KeyLocks {
    store: Arc<dyn KeyValueStore>,
    local: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            local: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for the lock on `name`.
    ///
    /// Callers holding several locks must always take them in the same order.
    pub async fn acquire(&self, name: &str) -> Result<KeyLock, StoreError> {
        let local = {
            let mut locks = self.local.lock().await;
            if locks.len() > LOCK_TABLE_SWEEP_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let local = local.lock_owned().await;

        let key = lease_key(name);
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + ACQUIRE_TIMEOUT;
        while !self.store.put_if_absent(&key, token.clone(), LEASE).await? {
            if Instant::now() >= deadline {
                tracing::warn!(lock = %name, "Gave up waiting for lock");
                return Err(StoreError::LockTimeout(name.to_string()));
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }

        Ok(KeyLock {
            _local: local,
            store: self.store.clone(),
            key,
            token,
            held: true,
        })
    }
}

/// A held lock. Prefer [`KeyLock::release`]; dropping it releases in the background.
pub struct KeyLock {
    _local: OwnedMutexGuard<()>,
    store: Arc<dyn KeyValueStore>,
    key: String,
    token: String,
    held: bool,
}

impl KeyLock {
    pub async fn release(mut self) {
        self.held = false;
        if let Err(e) = self.store.delete_if_equals(&self.key, &self.token).await {
            tracing::warn!(lock = %self.key, "Failed to release lock: {}", e);
        }
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        let store = self.store.clone();
        let key = mem::take(&mut self.key);
        let token = mem::take(&mut self.token);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = store.delete_if_equals(&key, &token).await {
                    tracing::warn!(lock = %key, "Failed to release lock: {}", e);
                }
            });
        }
    }
}
