//! Gateway: HTTP and WebSocket surface of the room hub.

pub mod error;
mod handler;
pub mod middleware;
mod server;
mod signal;
pub mod state;

pub use error::ApiError;
pub use handler::{IDEMPOTENCY_KEY_HEADER, IDEMPOTENT_REPLAY_HEADER};
pub use server::{MAX_BODY_BYTES, Server, build_router};
pub use state::AppState;
