//! Route handlers.

mod admin;
mod http;
mod vault;
mod voice;
mod websocket;

pub use admin::{audit_verify, metrics};
pub use http::{IDEMPOTENCY_KEY_HEADER, IDEMPOTENT_REPLAY_HEADER, ask, get_room_detail, get_rooms, health};
pub use vault::{vault_delete, vault_get, vault_put};
pub use voice::{synthesize_speech, voice_ask, voice_session};
pub use websocket::{room_websocket_handler, websocket_handler};
