//! Room entity and its read models.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{
    error::RoomError,
    room_hub::PusherChannel,
    value_object::{ConnectionId, IdentityLabel, RoomName, Timestamp},
};

/// Who receives a relayed message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayMode {
    /// Every member except the sender
    #[default]
    Others,
    /// Every member including the sender
    All,
    /// Only the sender
    Echo,
}

/// One socket attached to a room
#[derive(Debug, Clone)]
pub struct Member {
    pub connection_id: ConnectionId,
    pub identity: IdentityLabel,
    pub joined_at: Timestamp,
    /// Outbound queue drained by the socket's writer task
    pub channel: PusherChannel,
}

impl Member {
    pub fn new(
        connection_id: ConnectionId,
        identity: IdentityLabel,
        joined_at: Timestamp,
        channel: PusherChannel,
    ) -> Self {
        Self {
            connection_id,
            identity,
            joined_at,
            channel,
        }
    }

    pub fn info(&self) -> MemberInfo {
        MemberInfo {
            connection_id: self.connection_id.clone(),
            identity: self.identity.clone(),
            joined_at: self.joined_at,
        }
    }
}

/// Member as exposed by snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub connection_id: ConnectionId,
    pub identity: IdentityLabel,
    pub joined_at: Timestamp,
}

/// Read-only view of a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room: RoomName,
    pub member_count: usize,
    pub members: Vec<MemberInfo>,
    pub created_at: Timestamp,
    pub uptime_ms: i64,
}

/// Broadcast domain keyed by name.
///
/// `members` mirrors exactly the sockets currently attached; the owner of the
/// room removes an entry on close, error or failed delivery.
#[derive(Debug)]
pub struct Room {
    pub name: RoomName,
    pub created_at: Timestamp,
    capacity: Option<usize>,
    members: HashMap<ConnectionId, Member>,
    /// Join order, for stable listings
    order: Vec<ConnectionId>,
}

impl Room {
    pub fn new(name: RoomName, created_at: Timestamp) -> Self {
        Self::with_capacity(name, created_at, None)
    }

    pub fn with_capacity(name: RoomName, created_at: Timestamp, capacity: Option<usize>) -> Self {
        Self {
            name,
            created_at,
            capacity,
            members: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a member. Returns the member count after insertion.
    pub fn add_member(&mut self, member: Member) -> Result<usize, RoomError> {
        if let Some(capacity) = self.capacity
            && self.members.len() >= capacity
        {
            return Err(RoomError::RoomFull {
                room: self.name.as_str().to_string(),
                capacity,
            });
        }
        let id = member.connection_id.clone();
        if self.members.insert(id.clone(), member).is_none() {
            self.order.push(id);
        }
        Ok(self.members.len())
    }

    /// Remove a member; `None` if it was already gone.
    pub fn remove_member(&mut self, connection_id: &ConnectionId) -> Option<Member> {
        let removed = self.members.remove(connection_id)?;
        self.order.retain(|id| id != connection_id);
        Some(removed)
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.members.contains_key(connection_id)
    }

    pub fn member(&self, connection_id: &ConnectionId) -> Option<&Member> {
        self.members.get(connection_id)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members other than `exclude`, in join order
    pub fn others(&self, exclude: &ConnectionId) -> Vec<ConnectionId> {
        self.order
            .iter()
            .filter(|id| *id != exclude)
            .cloned()
            .collect()
    }

    /// Recipients of a message sent by `sender` under the given relay mode
    pub fn relay_targets(&self, sender: &ConnectionId, mode: RelayMode) -> Vec<ConnectionId> {
        match mode {
            RelayMode::Others => self.others(sender),
            RelayMode::All => self.order.clone(),
            RelayMode::Echo => {
                if self.contains(sender) {
                    vec![sender.clone()]
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Push `payload` to each target, best-effort per recipient.
    ///
    /// Returns the targets whose channel is closed. The caller evicts them;
    /// delivery to the remaining targets is never aborted.
    pub fn deliver(&self, targets: &[ConnectionId], payload: &str) -> Vec<ConnectionId> {
        let mut dead = Vec::new();
        for target in targets {
            let Some(member) = self.members.get(target) else {
                continue;
            };
            if member.channel.send(payload.to_string()).is_err() {
                tracing::warn!(
                    room = %self.name,
                    connection_id = %target,
                    "Delivery failed, member channel closed"
                );
                dead.push(target.clone());
            }
        }
        dead
    }

    pub fn snapshot(&self, now: Timestamp) -> RoomSnapshot {
        let members: Vec<MemberInfo> = self
            .order
            .iter()
            .filter_map(|id| self.members.get(id))
            .map(Member::info)
            .collect();
        RoomSnapshot {
            room: self.name.clone(),
            member_count: members.len(),
            members,
            created_at: self.created_at,
            uptime_ms: (now.value() - self.created_at.value()).max(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn create_test_room(capacity: Option<usize>) -> Room {
        Room::with_capacity(
            RoomName::new("r1".to_string()).unwrap(),
            Timestamp::new(1_000),
            capacity,
        )
    }

    fn member(id: &str) -> (Member, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let member = Member::new(
            ConnectionId::from(id),
            IdentityLabel::from_raw(Some(id)),
            Timestamp::new(1_000),
            tx,
        );
        (member, rx)
    }

    #[test]
    fn test_add_and_remove_member() {
        // テスト項目: メンバーの追加と削除が member_count に反映される
        // given (前提条件):
        let mut room = create_test_room(None);
        let (alice, _rx_a) = member("alice");
        let (bob, _rx_b) = member("bob");

        // when (操作):
        assert_eq!(room.add_member(alice).unwrap(), 1);
        assert_eq!(room.add_member(bob).unwrap(), 2);
        let removed = room.remove_member(&ConnectionId::from("alice"));
        let removed_again = room.remove_member(&ConnectionId::from("alice"));

        // then (期待する結果):
        assert!(removed.is_some());
        assert!(removed_again.is_none());
        assert_eq!(room.member_count(), 1);
    }

    #[test]
    fn test_add_member_capacity_exceeded() {
        // テスト項目: 上限に達したルームへの追加は RoomFull になる
        // given (前提条件):
        let mut room = create_test_room(Some(1));
        let (alice, _rx_a) = member("alice");
        let (bob, _rx_b) = member("bob");
        room.add_member(alice).unwrap();

        // when (操作):
        let result = room.add_member(bob);

        // then (期待する結果):
        assert_eq!(
            result,
            Err(RoomError::RoomFull {
                room: "r1".to_string(),
                capacity: 1
            })
        );
        assert_eq!(room.member_count(), 1);
    }

    #[test]
    fn test_relay_targets_by_mode() {
        // テスト項目: RelayMode ごとに配信対象が切り替わる
        // given (前提条件):
        let mut room = create_test_room(None);
        for id in ["a", "b", "c"] {
            let (m, _rx) = member(id);
            room.add_member(m).unwrap();
        }
        let sender = ConnectionId::from("a");

        // when (操作):
        let others = room.relay_targets(&sender, RelayMode::Others);
        let all = room.relay_targets(&sender, RelayMode::All);
        let echo = room.relay_targets(&sender, RelayMode::Echo);

        // then (期待する結果):
        assert_eq!(others, vec![ConnectionId::from("b"), ConnectionId::from("c")]);
        assert_eq!(all.len(), 3);
        assert_eq!(echo, vec![sender]);
    }

    #[test]
    fn test_deliver_reports_dead_channels_without_aborting() {
        // テスト項目: 送信失敗したメンバーを報告しつつ、他のメンバーへの配信は続行される
        // given (前提条件):
        let mut room = create_test_room(None);
        let (a, mut rx_a) = member("a");
        let (b, rx_b) = member("b");
        let (c, mut rx_c) = member("c");
        room.add_member(a).unwrap();
        room.add_member(b).unwrap();
        room.add_member(c).unwrap();
        drop(rx_b);

        // when (操作):
        let targets = room.relay_targets(&ConnectionId::from("x"), RelayMode::All);
        let dead = room.deliver(&targets, "hello");

        // then (期待する結果):
        assert_eq!(dead, vec![ConnectionId::from("b")]);
        assert_eq!(rx_a.try_recv().unwrap(), "hello");
        assert_eq!(rx_c.try_recv().unwrap(), "hello");
    }

    #[test]
    fn test_snapshot_lists_members_in_join_order() {
        // テスト項目: スナップショットは参加順にメンバーを列挙し、稼働時間を計算する
        // given (前提条件):
        let mut room = create_test_room(None);
        let (charlie, _rx_c) = member("charlie");
        let (alice, _rx_a) = member("alice");
        room.add_member(charlie).unwrap();
        room.add_member(alice).unwrap();

        // when (操作):
        let snapshot = room.snapshot(Timestamp::new(4_000));

        // then (期待する結果):
        assert_eq!(snapshot.member_count, 2);
        assert_eq!(snapshot.members[0].connection_id.as_str(), "charlie");
        assert_eq!(snapshot.members[1].connection_id.as_str(), "alice");
        assert_eq!(snapshot.uptime_ms, 3_000);
    }
}
