//! UseCase: ルーム詳細取得処理

use std::sync::Arc;

use crate::domain::{AuthContext, RoomHub, RoomName, RoomSnapshot, UsageDelta};

use super::{admission::AdmissionController, error::GetRoomDetailError};

/// ルーム詳細取得のユースケース
pub struct GetRoomDetailUseCase {
    hub: Arc<dyn RoomHub>,
    admission: Arc<AdmissionController>,
    max_room_name_len: usize,
}

impl GetRoomDetailUseCase {
    pub fn new(
        hub: Arc<dyn RoomHub>,
        admission: Arc<AdmissionController>,
        max_room_name_len: usize,
    ) -> Self {
        Self {
            hub,
            admission,
            max_room_name_len,
        }
    }

    /// Validate the name, charge one request, then look the room up
    pub async fn execute(
        &self,
        auth: &AuthContext,
        name: String,
    ) -> Result<RoomSnapshot, GetRoomDetailError> {
        let room = RoomName::with_max_len(name, self.max_room_name_len)?;
        self.admission
            .try_admit(auth, UsageDelta::request())
            .await?;
        self.hub
            .snapshot(&room)
            .await
            .ok_or_else(|| GetRoomDetailError::RoomNotFound(room.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{Dimension, Identity, IdentityLabel, PlanLimitTable, PlanLimits, PlanTier},
        infrastructure::{
            ActorRoomHub, AuditRecorder, InMemoryStore, RoomHubSettings, StoreAuditLog,
            UsageLedger,
        },
        usecase::{AdmissionError, GetRoomsUseCase},
    };
    use consia_shared::time::{Clock, FixedClock};
    use std::{collections::HashMap, time::Duration};
    use tokio::sync::mpsc;

    struct Fixture {
        hub: Arc<dyn RoomHub>,
        admission: Arc<AdmissionController>,
    }

    fn fixture(plans: PlanLimitTable) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(1_714_521_600_000));
        let (audit, _handle) =
            AuditRecorder::spawn(Arc::new(StoreAuditLog::new(store.clone(), 100)));
        let ledger = Arc::new(UsageLedger::new(store, Duration::from_secs(3600)));
        let admission = Arc::new(AdmissionController::new(
            ledger,
            plans,
            None,
            clock.clone(),
            audit,
        ));
        Fixture {
            hub: Arc::new(ActorRoomHub::new(RoomHubSettings::default(), clock)),
            admission,
        }
    }

    fn device() -> AuthContext {
        AuthContext::new(
            Identity::Device {
                id: "kiosk".to_string(),
            },
            PlanTier::Free,
        )
    }

    #[tokio::test]
    async fn test_get_room_detail_success() {
        // テスト項目: 存在するルームの詳細が取得できる
        // given (前提条件):
        let f = fixture(PlanLimitTable::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        f.hub
            .join(
                RoomName::new("lobby".to_string()).unwrap(),
                IdentityLabel::from_raw(Some("alice")),
                tx,
            )
            .await
            .unwrap();
        let usecase = GetRoomDetailUseCase::new(f.hub.clone(), f.admission.clone(), 64);

        // when (操作):
        let snapshot = usecase
            .execute(&device(), "lobby".to_string())
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(snapshot.member_count, 1);
        assert_eq!(snapshot.members[0].identity.as_str(), "alice");
        let rooms = GetRoomsUseCase::new(f.hub, f.admission)
            .execute(&device())
            .await
            .unwrap();
        assert_eq!(rooms.len(), 1);
    }

    #[tokio::test]
    async fn test_get_room_detail_not_found() {
        // テスト項目: 存在しないルームは RoomNotFound になる
        // given (前提条件):
        let f = fixture(PlanLimitTable::default());
        let usecase = GetRoomDetailUseCase::new(f.hub, f.admission, 64);

        // when (操作):
        let result = usecase.execute(&device(), "nowhere".to_string()).await;

        // then (期待する結果):
        assert!(matches!(result, Err(GetRoomDetailError::RoomNotFound(_))));
    }

    #[tokio::test]
    async fn test_get_room_detail_invalid_name() {
        // テスト項目: 空のルーム名は InvalidRoomName になる
        // given (前提条件):
        let f = fixture(PlanLimitTable::default());
        let usecase = GetRoomDetailUseCase::new(f.hub, f.admission, 64);

        // when (操作):
        let result = usecase.execute(&device(), String::new()).await;

        // then (期待する結果):
        assert!(matches!(result, Err(GetRoomDetailError::InvalidRoomName(_))));
    }

    #[tokio::test]
    async fn test_room_reads_share_the_request_limit() {
        // テスト項目: 一覧と詳細の取得はどちらも requests を 1 消費し、上限を超えると拒否される
        // given (前提条件):
        let plans = PlanLimitTable::new(HashMap::from([(
            PlanTier::Free,
            PlanLimits {
                max_requests: Some(2),
                ..PlanLimits::unlimited()
            },
        )]));
        let f = fixture(plans);
        let rooms = GetRoomsUseCase::new(f.hub.clone(), f.admission.clone());
        let detail = GetRoomDetailUseCase::new(f.hub, f.admission, 64);

        // when (操作):
        let first = rooms.execute(&device()).await;
        let second = detail.execute(&device(), "nowhere".to_string()).await;
        let third = rooms.execute(&device()).await;
        let fourth = detail.execute(&device(), "nowhere".to_string()).await;

        // then (期待する結果):
        assert!(first.is_ok());
        assert!(matches!(second, Err(GetRoomDetailError::RoomNotFound(_))));
        assert!(matches!(
            third,
            Err(AdmissionError::Rejected(Dimension::Requests))
        ));
        assert!(matches!(
            fourth,
            Err(GetRoomDetailError::Rejected(Dimension::Requests))
        ));
    }
}
