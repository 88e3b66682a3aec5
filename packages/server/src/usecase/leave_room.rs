//! UseCase: ルーム退出処理
//!
//! ソケットの close / error / ping タイムアウトのいずれでも呼ばれます。
//! 同じ接続に対して複数回呼ばれても、通知と監査ログは最初の 1 回だけです。

use std::sync::Arc;

use consia_shared::time::Clock;
use serde_json::json;

use crate::{
    domain::{AuditEvent, AuditKind, AuthContext, ConnectionHandle, RoomError, RoomHub, Timestamp},
    infrastructure::AuditRecorder,
};

/// ルーム退出のユースケース
pub struct LeaveRoomUseCase {
    hub: Arc<dyn RoomHub>,
    audit: AuditRecorder,
    clock: Arc<dyn Clock>,
}

impl LeaveRoomUseCase {
    pub fn new(
        hub: Arc<dyn RoomHub>,
        audit: AuditRecorder,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            hub,
            audit,
            clock,
        }
    }

    /// Detach the connection. Returns `false` when it had already left.
    pub async fn execute(
        &self,
        auth: &AuthContext,
        handle: &ConnectionHandle,
    ) -> Result<bool, RoomError> {
        let removed = self.hub.leave(handle).await?;
        if !removed {
            return Ok(false);
        }
        self.audit.record(AuditEvent::new(
            Timestamp::new(self.clock.now_millis()),
            AuditKind::RoomLeave,
            auth.identity.key(),
            json!({
                "room": handle.room,
                "connection_id": handle.connection_id,
            }),
        ));
        Ok(true)
    }
}
