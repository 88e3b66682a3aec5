//! UseCase 層
//!
//! 1 操作 = 1 ユースケース構造体。ドメインのポート（RoomHub, KeyValueStore,
//! AiProvider, SpeechProvider, AuditLog）にのみ依存し、UI 層から呼び出されます。

pub mod admin_metrics;
pub mod admission;
pub mod ask;
pub mod error;
pub mod get_room_detail;
pub mod get_rooms;
pub mod join_room;
pub mod leave_room;
pub mod provider_call;
pub mod relay_message;
pub mod synthesize_speech;
pub mod vault;
pub mod voice_ask;
pub mod voice_session;

pub use admin_metrics::{AdminMetricsUseCase, AuditVerification, MetricsReport};
pub use admission::{Admission, AdmissionController};
pub use ask::{AskOutcome, AskUseCase};
pub use error::{
    AdminError, AdmissionError, AiUseCaseError, GetRoomDetailError, JoinRoomError, VaultError,
};
pub use get_room_detail::GetRoomDetailUseCase;
pub use get_rooms::GetRoomsUseCase;
pub use join_room::JoinRoomUseCase;
pub use leave_room::LeaveRoomUseCase;
pub use provider_call::{AiSettings, DEFAULT_SYSTEM_PROMPT};
pub use relay_message::RelayMessageUseCase;
pub use synthesize_speech::{MAX_TTS_INPUT_CHARS, SynthesizeSpeechUseCase};
pub use vault::{MAX_VAULT_KEY_LEN, VaultUseCase, valid_vault_key};
pub use voice_ask::{AudioUpload, VoiceAskOutcome, VoiceAskUseCase};
pub use voice_session::VoiceSessionUseCase;
