//! 監査ログ実装
//!
//! ## 責務
//!
//! - `StoreAuditLog`: KeyValueStore 上のハッシュチェーン付き追記専用ログ
//! - `AuditRecorder`: ゲートウェイからの fire-and-forget 書き込み口
//!
//! ## 設計ノート
//!
//! 書き込みは単一のライタータスクに集約されます。チェーンの先頭ポインタは
//! キャッシュせず、追記のたびにストア上のロックを取ってから読み直すので、
//! 同じストアを共有する複数のインスタンスが追記してもチェーンは分岐しません。
//! 保持件数を超えた分は最古側からのみ削除されます。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    domain::{
        AuditEntry, AuditError, AuditEvent, AuditLog, GENESIS_HASH, KeyValueStore, StoreError,
        compute_entry_hash,
    },
    infrastructure::store::KeyLocks,
};

const HEAD_KEY: &str = "audit:head";

fn entry_key(id: u64) -> String {
    format!("audit:entry:{id:020}")
}

/// Chain head pointer, persisted next to the entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ChainHead {
    /// Oldest retained id
    first_id: u64,
    /// Id the next append receives
    next_id: u64,
    last_hash: String,
}

impl ChainHead {
    fn genesis() -> Self {
        Self {
            first_id: 0,
            next_id: 0,
            last_hash: GENESIS_HASH.to_string(),
        }
    }
}

/// KeyValueStore を使った AuditLog 実装
pub struct StoreAuditLog {
    store: Arc<dyn KeyValueStore>,
    max_entries: usize,
    /// Guards the chain head across every writer of the store
    locks: KeyLocks,
}

impl StoreAuditLog {
    pub fn new(store: Arc<dyn KeyValueStore>, max_entries: usize) -> Self {
        Self {
            locks: KeyLocks::new(store.clone()),
            store,
            max_entries: max_entries.max(1),
        }
    }

    async fn load_head(&self) -> Result<ChainHead, AuditError> {
        match self.store.get(HEAD_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw).map_err(StoreError::from)?),
            None => Ok(ChainHead::genesis()),
        }
    }

    /// Chain `event` onto the stored head. The caller holds the head lock.
    async fn append_locked(&self, event: AuditEvent) -> Result<u64, AuditError> {
        let head = self.load_head().await?;
        let hash = compute_entry_hash(&event, &head.last_hash)?;
        let entry = AuditEntry {
            id: head.next_id,
            event,
            prev_hash: head.last_hash.clone(),
            hash: hash.clone(),
        };
        self.store
            .put(&entry_key(entry.id), serde_json::to_string(&entry)?, None)
            .await?;

        let mut next = ChainHead {
            first_id: head.first_id,
            next_id: head.next_id + 1,
            last_hash: hash,
        };
        while next.next_id - next.first_id > self.max_entries as u64 {
            self.store.delete(&entry_key(next.first_id)).await?;
            next.first_id += 1;
        }
        self.store
            .put(HEAD_KEY, serde_json::to_string(&next)?, None)
            .await?;
        Ok(entry.id)
    }

    async fn read_range(&self, from: u64, to: u64) -> Result<Vec<AuditEntry>, AuditError> {
        let mut entries = Vec::with_capacity((to - from) as usize);
        for id in from..to {
            if let Some(raw) = self.store.get(&entry_key(id)).await? {
                entries.push(serde_json::from_str(&raw).map_err(StoreError::from)?);
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl AuditLog for StoreAuditLog {
    async fn append(&self, event: AuditEvent) -> Result<u64, AuditError> {
        let lock = self.locks.acquire(HEAD_KEY).await?;
        let result = self.append_locked(event).await;
        lock.release().await;
        result
    }

    async fn recent(&self, n: usize) -> Result<Vec<AuditEntry>, AuditError> {
        let head = self.load_head().await?;
        let from = head.next_id.saturating_sub(n as u64).max(head.first_id);
        self.read_range(from, head.next_id).await
    }

    async fn entries(&self) -> Result<Vec<AuditEntry>, AuditError> {
        let head = self.load_head().await?;
        self.read_range(head.first_id, head.next_id).await
    }
}

enum AuditCommand {
    Append(AuditEvent),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget front of the audit log.
///
/// Events are queued and appended in submission order by one writer task.
/// Append failures are logged and never reach the caller.
#[derive(Clone)]
pub struct AuditRecorder {
    tx: mpsc::UnboundedSender<AuditCommand>,
}

impl AuditRecorder {
    /// Spawn the writer task
    pub fn spawn(log: Arc<dyn AuditLog>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    AuditCommand::Append(event) => {
                        let kind = event.kind;
                        if let Err(e) = log.append(event).await {
                            tracing::error!(?kind, "Failed to append audit entry: {}", e);
                        }
                    }
                    AuditCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            tracing::debug!("Audit recorder stopped");
        });
        (Self { tx }, handle)
    }

    pub fn record(&self, event: AuditEvent) {
        if self.tx.send(AuditCommand::Append(event)).is_err() {
            tracing::error!("Audit recorder is gone, dropping audit event");
        }
    }

    /// Wait until every event recorded before this call has been appended
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(AuditCommand::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}
