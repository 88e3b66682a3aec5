//! ルームアクター
//!
//! 1 つのルームにつき 1 タスクが `Room` を所有し、コマンドキューから順に処理する。
//! 同じルームへの join / relay / leave は常に直列化され、ロックは使わない。
//! メンバー表が変わったコマンドの後には、返信より先に presence スナップショットを送る。

use std::{collections::VecDeque, sync::Arc};

use consia_shared::time::Clock;
use tokio::sync::{mpsc, oneshot};

use crate::{
    domain::{ConnectionId, Member, RelayMode, Room, RoomError, RoomSnapshot, Timestamp},
    infrastructure::dto::websocket::{ClientFrame, PresenceEvent, ServerFrame},
};

use super::presence::PresencePublisher;

pub(super) enum RoomCommand {
    Join {
        member: Member,
        reply: oneshot::Sender<Result<usize, RoomError>>,
    },
    Relay {
        from: ConnectionId,
        raw: String,
    },
    Leave {
        connection_id: ConnectionId,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
}

pub(super) struct RoomActor {
    room: Room,
    relay_mode: RelayMode,
    clock: Arc<dyn Clock>,
    presence: Option<PresencePublisher>,
    /// Membership changed since the last published snapshot
    dirty: bool,
}

impl RoomActor {
    pub(super) fn new(
        room: Room,
        relay_mode: RelayMode,
        clock: Arc<dyn Clock>,
        presence: Option<PresencePublisher>,
    ) -> Self {
        Self {
            room,
            relay_mode,
            clock,
            presence,
            dirty: false,
        }
    }

    /// Run until every command sender is dropped
    pub(super) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<RoomCommand>) {
        tracing::debug!(room = %self.room.name, "Room actor started");
        while let Some(command) = commands.recv().await {
            self.handle(command);
        }
        tracing::debug!(room = %self.room.name, "Room actor stopped");
    }

    fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }

    fn handle(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Join { member, reply } => {
                let result = self.join(member);
                self.publish_presence();
                let _ = reply.send(result);
            }
            RoomCommand::Relay { from, raw } => {
                self.relay(&from, &raw);
                self.publish_presence();
            }
            RoomCommand::Leave {
                connection_id,
                reply,
            } => {
                let removed = self.leave(&connection_id);
                self.publish_presence();
                let _ = reply.send(removed);
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.room.snapshot(self.now()));
            }
        }
    }

    fn publish_presence(&mut self) {
        if !std::mem::take(&mut self.dirty) {
            return;
        }
        if let Some(presence) = &self.presence {
            presence.publish(self.room.snapshot(self.now()));
        }
    }

    fn join(&mut self, member: Member) -> Result<usize, RoomError> {
        let connection_id = member.connection_id.clone();
        let identity = member.identity.clone();
        let member_count = self.room.add_member(member)?;
        self.dirty = true;
        tracing::info!(
            room = %self.room.name,
            connection_id = %connection_id,
            identity = %identity,
            member_count,
            "Member joined"
        );

        // Existing members learn about the newcomer first
        let presence = ServerFrame::Presence {
            event: PresenceEvent::Join,
            room: self.room.name.clone(),
            connection_id: connection_id.clone(),
            identity,
            member_count,
            ts: self.now(),
        };
        let targets = self.room.others(&connection_id);
        self.broadcast(&targets, &presence.to_text());

        let snapshot = self.room.snapshot(self.now());
        let welcome = ServerFrame::Welcome {
            room: self.room.name.clone(),
            connection_id: connection_id.clone(),
            member_count: snapshot.member_count,
            members: snapshot.members,
        };
        self.broadcast(&[connection_id], &welcome.to_text());

        Ok(self.room.member_count())
    }

    fn relay(&mut self, from: &ConnectionId, raw: &str) {
        let Some(sender) = self.room.member(from) else {
            tracing::debug!(
                room = %self.room.name,
                connection_id = %from,
                "Dropping message from a connection that already left"
            );
            return;
        };

        let data = match ClientFrame::parse(raw) {
            ClientFrame::Data(value) => value,
            // Pings are answered by the socket handler; a stray one is relayed as-is
            ClientFrame::Ping => serde_json::json!({ "type": "ping" }),
        };
        let frame = ServerFrame::Message {
            room: self.room.name.clone(),
            from: from.clone(),
            identity: sender.identity.clone(),
            ts: self.now(),
            data,
        };
        let targets = self.room.relay_targets(from, self.relay_mode);
        tracing::debug!(
            room = %self.room.name,
            connection_id = %from,
            recipients = targets.len(),
            "Relaying message"
        );
        self.broadcast(&targets, &frame.to_text());
    }

    fn leave(&mut self, connection_id: &ConnectionId) -> bool {
        let Some(member) = self.room.remove_member(connection_id) else {
            return false;
        };
        self.dirty = true;
        tracing::info!(
            room = %self.room.name,
            connection_id = %connection_id,
            identity = %member.identity,
            member_count = self.room.member_count(),
            "Member left"
        );
        self.announce_leave(&member);
        true
    }

    fn announce_leave(&mut self, member: &Member) {
        let frame = self.leave_frame(member);
        let targets = self.room.others(&member.connection_id);
        self.broadcast(&targets, &frame);
    }

    fn leave_frame(&self, member: &Member) -> String {
        ServerFrame::Presence {
            event: PresenceEvent::Leave,
            room: self.room.name.clone(),
            connection_id: member.connection_id.clone(),
            identity: member.identity.clone(),
            member_count: self.room.member_count(),
            ts: self.now(),
        }
        .to_text()
    }

    /// Deliver to each target and evict every member whose channel is closed.
    ///
    /// Evictions announce a `leave`, which can surface further dead members;
    /// those are evicted in the same pass.
    fn broadcast(&mut self, targets: &[ConnectionId], payload: &str) {
        let mut dead: VecDeque<ConnectionId> = self.room.deliver(targets, payload).into();
        while let Some(connection_id) = dead.pop_front() {
            let Some(member) = self.room.remove_member(&connection_id) else {
                continue;
            };
            self.dirty = true;
            tracing::info!(
                room = %self.room.name,
                connection_id = %connection_id,
                member_count = self.room.member_count(),
                "Evicted unreachable member"
            );
            let frame = self.leave_frame(&member);
            let others = self.room.others(&member.connection_id);
            dead.extend(self.room.deliver(&others, &frame));
        }
    }
}
