//! アクター方式の RoomHub 実装
//!
//! ## 責務
//!
//! - ルーム名ごとに `RoomActor` を遅延生成し、コマンドを振り分ける
//! - 接続 ID の採番と `Member` の生成
//! - メンバー表が変わるたびに presence スナップショットを `PresencePublisher` へ渡す
//!
//! ## 設計ノート
//!
//! ルーム表のロックはアクターの検索と生成の間だけ保持されます。
//! メンバー表の変更はすべて各ルームのアクター内で行われるため、
//! 異なるルームの処理は互いに待ち合わせません。

mod actor;
mod presence;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use consia_shared::time::Clock;
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::domain::{
    ConnectionHandle, ConnectionId, IdentityLabel, Member, PusherChannel, RelayMode, Room,
    RoomError, RoomHub, RoomName, RoomSnapshot, Timestamp,
};

use actor::{RoomActor, RoomCommand};

pub use presence::{PresencePublisher, presence_key};

/// Behaviour shared by every room of a hub
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoomHubSettings {
    pub relay_mode: RelayMode,
    /// Maximum members per room; `None` is unbounded
    pub capacity: Option<usize>,
}

/// RoomHub backed by one actor task per room
pub struct ActorRoomHub {
    rooms: Mutex<HashMap<RoomName, mpsc::UnboundedSender<RoomCommand>>>,
    settings: RoomHubSettings,
    clock: Arc<dyn Clock>,
    presence: Option<PresencePublisher>,
}

impl ActorRoomHub {
    pub fn new(settings: RoomHubSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            settings,
            clock,
            presence: None,
        }
    }

    /// Persist a snapshot of each room after every membership change
    pub fn with_presence(mut self, presence: PresencePublisher) -> Self {
        self.presence = Some(presence);
        self
    }

    /// Command queue of `room`, spawning its actor on first use
    async fn open(&self, room: &RoomName) -> mpsc::UnboundedSender<RoomCommand> {
        let mut rooms = self.rooms.lock().await;
        if let Some(commands) = rooms.get(room) {
            return commands.clone();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let created_at = Timestamp::new(self.clock.now_millis());
        let actor = RoomActor::new(
            Room::with_capacity(room.clone(), created_at, self.settings.capacity),
            self.settings.relay_mode,
            self.clock.clone(),
            self.presence.clone(),
        );
        tokio::spawn(actor.run(rx));
        tracing::info!(room = %room, "Room created");
        rooms.insert(room.clone(), tx.clone());
        tx
    }

    async fn existing(&self, room: &RoomName) -> Option<mpsc::UnboundedSender<RoomCommand>> {
        self.rooms.lock().await.get(room).cloned()
    }

    async fn request_snapshot(
        commands: &mpsc::UnboundedSender<RoomCommand>,
    ) -> Option<RoomSnapshot> {
        let (reply, response) = oneshot::channel();
        commands.send(RoomCommand::Snapshot { reply }).ok()?;
        response.await.ok()
    }
}

fn unavailable(room: &RoomName) -> RoomError {
    RoomError::HubUnavailable(room.as_str().to_string())
}

#[async_trait]
impl RoomHub for ActorRoomHub {
    async fn join(
        &self,
        room: RoomName,
        identity: IdentityLabel,
        channel: PusherChannel,
    ) -> Result<ConnectionHandle, RoomError> {
        let commands = self.open(&room).await;
        let connection_id = ConnectionId::generate();
        let member = Member::new(
            connection_id.clone(),
            identity.clone(),
            Timestamp::new(self.clock.now_millis()),
            channel,
        );

        let (reply, response) = oneshot::channel();
        commands
            .send(RoomCommand::Join { member, reply })
            .map_err(|_| unavailable(&room))?;
        response.await.map_err(|_| unavailable(&room))??;

        Ok(ConnectionHandle {
            connection_id,
            room,
            identity,
        })
    }

    async fn relay(&self, handle: &ConnectionHandle, raw: String) -> Result<(), RoomError> {
        let commands = self
            .existing(&handle.room)
            .await
            .ok_or_else(|| unavailable(&handle.room))?;
        commands
            .send(RoomCommand::Relay {
                from: handle.connection_id.clone(),
                raw,
            })
            .map_err(|_| unavailable(&handle.room))
    }

    async fn leave(&self, handle: &ConnectionHandle) -> Result<bool, RoomError> {
        let Some(commands) = self.existing(&handle.room).await else {
            return Ok(false);
        };
        let (reply, response) = oneshot::channel();
        commands
            .send(RoomCommand::Leave {
                connection_id: handle.connection_id.clone(),
                reply,
            })
            .map_err(|_| unavailable(&handle.room))?;
        response.await.map_err(|_| unavailable(&handle.room))
    }

    async fn snapshot(&self, room: &RoomName) -> Option<RoomSnapshot> {
        let commands = self.existing(room).await?;
        Self::request_snapshot(&commands).await
    }

    async fn list(&self) -> Vec<RoomSnapshot> {
        let queues: Vec<_> = self.rooms.lock().await.values().cloned().collect();
        let mut snapshots = Vec::with_capacity(queues.len());
        for commands in &queues {
            if let Some(snapshot) = Self::request_snapshot(commands).await {
                snapshots.push(snapshot);
            }
        }
        snapshots.sort_by(|a, b| a.room.cmp(&b.room));
        snapshots
    }
}
