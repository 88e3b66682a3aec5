//! UseCase: メッセージ中継処理
//!
//! クライアントから受け取った生のテキストを、送信者のルームへ中継します。
//! ペイロードの形式で失敗することはありません（JSON でなければ文字列として包まれます）。

use std::sync::Arc;

use crate::domain::{ConnectionHandle, RoomError, RoomHub};

/// メッセージ中継のユースケース
pub struct RelayMessageUseCase {
    hub: Arc<dyn RoomHub>,
}

impl RelayMessageUseCase {
    pub fn new(hub: Arc<dyn RoomHub>) -> Self {
        Self { hub }
    }

    pub async fn execute(&self, handle: &ConnectionHandle, raw: String) -> Result<(), RoomError> {
        self.hub.relay(handle, raw).await
    }
}
