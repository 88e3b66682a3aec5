//! presence スナップショットの書き込み
//!
//! ルームアクターはメンバー表を変更するたびにスナップショットをここへ送ります。
//! 書き込みは単一のタスクが受信順に行うので、`presence:{room}` には常に
//! そのルームの最新のメンバー表が残ります。

use std::sync::Arc;

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::domain::{KeyValueStore, RoomName, RoomSnapshot};

/// KV key of the latest presence snapshot of a room
pub fn presence_key(room: &RoomName) -> String {
    format!("presence:{}", room.as_str())
}

enum PresenceCommand {
    Publish(RoomSnapshot),
    Flush(oneshot::Sender<()>),
}

/// Ordered, best-effort writer of presence snapshots
#[derive(Clone)]
pub struct PresencePublisher {
    tx: mpsc::UnboundedSender<PresenceCommand>,
}

impl PresencePublisher {
    /// Spawn the writer task
    pub fn spawn(store: Arc<dyn KeyValueStore>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    PresenceCommand::Publish(snapshot) => write(store.as_ref(), &snapshot).await,
                    PresenceCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });
        (Self { tx }, handle)
    }

    pub(super) fn publish(&self, snapshot: RoomSnapshot) {
        if self.tx.send(PresenceCommand::Publish(snapshot)).is_err() {
            tracing::warn!("Presence writer is gone, dropping snapshot");
        }
    }

    /// Wait until every snapshot published before this call has been written
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(PresenceCommand::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

async fn write(store: &dyn KeyValueStore, snapshot: &RoomSnapshot) {
    let raw = match serde_json::to_string(snapshot) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(room = %snapshot.room, "Failed to serialize presence snapshot: {}", e);
            return;
        }
    };
    if let Err(e) = store.put(&presence_key(&snapshot.room), raw, None).await {
        tracing::warn!(room = %snapshot.room, "Failed to store presence snapshot: {}", e);
    }
}
