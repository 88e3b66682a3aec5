//! UseCase: ルーム一覧取得処理

use std::sync::Arc;

use crate::domain::{AuthContext, RoomHub, RoomSnapshot, UsageDelta};

use super::{admission::AdmissionController, error::AdmissionError};

/// ルーム一覧取得のユースケース
pub struct GetRoomsUseCase {
    hub: Arc<dyn RoomHub>,
    admission: Arc<AdmissionController>,
}

impl GetRoomsUseCase {
    pub fn new(hub: Arc<dyn RoomHub>, admission: Arc<AdmissionController>) -> Self {
        Self { hub, admission }
    }

    /// Charge one request, then list every room created so far, ordered by name
    pub async fn execute(&self, auth: &AuthContext) -> Result<Vec<RoomSnapshot>, AdmissionError> {
        self.admission
            .try_admit(auth, UsageDelta::request())
            .await?;
        Ok(self.hub.list().await)
    }
}
