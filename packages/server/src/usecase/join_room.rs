//! UseCase: ルーム参加処理
//!
//! ## 処理の流れ
//!
//! 1. `prepare`: ルーム名の検証と Admission（アップグレード前に HTTP で拒否できるように）
//! 2. `execute`: RoomHub への参加と監査ログ記録（presence スナップショットはルームアクターが保存）
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ルーム名省略時に `global` になること
//! - 不正なルーム名と上限超過の拒否
//! - 参加後に presence スナップショットが KV に保存されること（PresencePublisher 経由）
//! - 定員超過時のエラー

use std::sync::Arc;

use consia_shared::time::Clock;
use serde_json::json;

use crate::{
    domain::{
        AuditEvent, AuditKind, AuthContext, ConnectionHandle, IdentityLabel, PusherChannel,
        RoomHub, RoomName, Timestamp, UsageDelta,
    },
    infrastructure::AuditRecorder,
};

use super::{admission::AdmissionController, error::JoinRoomError};

/// ルーム参加のユースケース
pub struct JoinRoomUseCase {
    hub: Arc<dyn RoomHub>,
    admission: Arc<AdmissionController>,
    audit: AuditRecorder,
    clock: Arc<dyn Clock>,
    max_room_name_len: usize,
}

impl JoinRoomUseCase {
    pub fn new(
        hub: Arc<dyn RoomHub>,
        admission: Arc<AdmissionController>,
        audit: AuditRecorder,
        clock: Arc<dyn Clock>,
        max_room_name_len: usize,
    ) -> Self {
        Self {
            hub,
            admission,
            audit,
            clock,
            max_room_name_len,
        }
    }

    /// Validate the requested room and charge one request
    pub async fn prepare(
        &self,
        auth: &AuthContext,
        room: Option<&str>,
    ) -> Result<RoomName, JoinRoomError> {
        let room = match room.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => RoomName::with_max_len(name.to_string(), self.max_room_name_len)?,
            None => RoomName::global(),
        };
        self.admission
            .try_admit(auth, UsageDelta::request())
            .await?;
        Ok(room)
    }

    /// Attach the socket behind `channel` to `room`
    pub async fn execute(
        &self,
        auth: &AuthContext,
        room: RoomName,
        label: IdentityLabel,
        channel: PusherChannel,
    ) -> Result<ConnectionHandle, JoinRoomError> {
        let handle = self.hub.join(room, label, channel).await?;

        self.audit.record(AuditEvent::new(
            Timestamp::new(self.clock.now_millis()),
            AuditKind::RoomJoin,
            auth.identity.key(),
            json!({
                "room": handle.room,
                "connection_id": handle.connection_id,
                "identity": handle.identity,
            }),
        ));
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{Dimension, Identity, PlanLimitTable, PlanLimits, PlanTier, RoomError, RoomSnapshot},
        domain::KeyValueStore,
        infrastructure::{
            ActorRoomHub, InMemoryStore, PresencePublisher, RoomHubSettings, StoreAuditLog,
            UsageLedger, presence_key,
        },
    };
    use consia_shared::time::FixedClock;
    use std::{collections::HashMap, time::Duration};
    use tokio::sync::mpsc;

    struct Fixture {
        usecase: JoinRoomUseCase,
        store: Arc<InMemoryStore>,
        presence: PresencePublisher,
    }

    fn fixture(settings: RoomHubSettings, plans: PlanLimitTable) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(1_714_521_600_000));
        let (audit, _handle) =
            AuditRecorder::spawn(Arc::new(StoreAuditLog::new(store.clone(), 100)));
        let ledger = Arc::new(UsageLedger::new(store.clone(), Duration::from_secs(3600)));
        let admission = Arc::new(AdmissionController::new(
            ledger,
            plans,
            None,
            clock.clone(),
            audit.clone(),
        ));
        let (presence, _task) = PresencePublisher::spawn(store.clone());
        let hub =
            Arc::new(ActorRoomHub::new(settings, clock.clone()).with_presence(presence.clone()));
        Fixture {
            usecase: JoinRoomUseCase::new(hub, admission, audit, clock, 16),
            store,
            presence,
        }
    }

    fn owner() -> AuthContext {
        AuthContext::new(Identity::Owner, PlanTier::Enterprise)
    }

    #[tokio::test]
    async fn test_prepare_defaults_to_global_room() {
        // テスト項目: ルーム名が省略・空白の場合は global になる
        // given (前提条件):
        let f = fixture(RoomHubSettings::default(), PlanLimitTable::default());

        // when (操作):
        let omitted = f.usecase.prepare(&owner(), None).await.unwrap();
        let blank = f.usecase.prepare(&owner(), Some("  ")).await.unwrap();

        // then (期待する結果):
        assert_eq!(omitted, RoomName::global());
        assert_eq!(blank, RoomName::global());
    }

    #[tokio::test]
    async fn test_prepare_rejects_too_long_name() {
        // テスト項目: 長さ上限を超えるルーム名は拒否される
        // given (前提条件):
        let f = fixture(RoomHubSettings::default(), PlanLimitTable::default());

        // when (操作):
        let result = f.usecase.prepare(&owner(), Some(&"x".repeat(17))).await;

        // then (期待する結果):
        assert!(matches!(result, Err(JoinRoomError::InvalidRoomName(_))));
    }

    #[tokio::test]
    async fn test_prepare_applies_request_limit() {
        // テスト項目: requests 上限に達した identity は参加前に拒否される
        // given (前提条件):
        let plans = PlanLimitTable::new(HashMap::from([(
            PlanTier::Free,
            PlanLimits {
                max_requests: Some(1),
                ..PlanLimits::unlimited()
            },
        )]));
        let f = fixture(RoomHubSettings::default(), plans);
        let auth = AuthContext::new(
            Identity::Anonymous {
                fingerprint: "abc".to_string(),
            },
            PlanTier::Free,
        );
        f.usecase.prepare(&auth, Some("r1")).await.unwrap();

        // when (操作):
        let result = f.usecase.prepare(&auth, Some("r1")).await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(JoinRoomError::Rejected(Dimension::Requests))
        ));
    }

    #[tokio::test]
    async fn test_execute_stores_presence_snapshot() {
        // テスト項目: 参加後に presence:{room} へスナップショットが保存される
        // given (前提条件):
        let f = fixture(RoomHubSettings::default(), PlanLimitTable::default());
        let room = f.usecase.prepare(&owner(), Some("r1")).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        // when (操作):
        let handle = f
            .usecase
            .execute(&owner(), room.clone(), IdentityLabel::from_raw(Some("alice")), tx)
            .await
            .unwrap();
        f.presence.flush().await;

        // then (期待する結果):
        let raw = f.store.get(&presence_key(&room)).await.unwrap().unwrap();
        let snapshot: RoomSnapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(snapshot.member_count, 1);
        assert_eq!(snapshot.members[0].connection_id, handle.connection_id);
        let welcome: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(welcome["type"], "welcome");
    }

    #[tokio::test]
    async fn test_execute_full_room() {
        // テスト項目: 定員に達したルームへの参加は RoomFull になる
        // given (前提条件):
        let f = fixture(
            RoomHubSettings {
                capacity: Some(1),
                ..RoomHubSettings::default()
            },
            PlanLimitTable::default(),
        );
        let room = RoomName::new("r1".to_string()).unwrap();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        f.usecase
            .execute(&owner(), room.clone(), IdentityLabel::from_raw(None), tx1)
            .await
            .unwrap();

        // when (操作):
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let result = f
            .usecase
            .execute(&owner(), room, IdentityLabel::from_raw(None), tx2)
            .await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(JoinRoomError::Room(RoomError::RoomFull { .. }))
        ));
    }
}
