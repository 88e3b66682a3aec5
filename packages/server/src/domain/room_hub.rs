//! Room hub port.
//!
//! The hub owns one isolated room per name and serializes every membership
//! change and relay for that room. Different rooms proceed independently.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    entity::RoomSnapshot,
    error::RoomError,
    value_object::{ConnectionId, IdentityLabel, RoomName},
};

/// Outbound queue of one socket. The hub pushes serialized frames into it.
pub type PusherChannel = mpsc::UnboundedSender<String>;

/// Back-reference from a socket to its room. Never owns the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub connection_id: ConnectionId,
    pub room: RoomName,
    pub identity: IdentityLabel,
}

#[async_trait]
pub trait RoomHub: Send + Sync {
    /// Attach a socket to `room`, creating the room on first use.
    ///
    /// Existing members receive a `presence: join`; the new socket receives
    /// `welcome` through `channel` before anything else.
    async fn join(
        &self,
        room: RoomName,
        identity: IdentityLabel,
        channel: PusherChannel,
    ) -> Result<ConnectionHandle, RoomError>;

    /// Relay a raw client payload to the room according to its relay mode.
    async fn relay(&self, handle: &ConnectionHandle, raw: String) -> Result<(), RoomError>;

    /// Detach a socket. Returns `false` when it was already gone.
    async fn leave(&self, handle: &ConnectionHandle) -> Result<bool, RoomError>;

    /// Read-only view of a room; `None` if the name was never used.
    async fn snapshot(&self, room: &RoomName) -> Option<RoomSnapshot>;

    /// Snapshots of every room created so far
    async fn list(&self) -> Vec<RoomSnapshot>;
}
