//! CONSIA core: a real-time room broadcast hub with per-plan usage and
//! budget enforcement, a hash-chained audit log, and the HTTP/WebSocket
//! gateway in front of them.

// layers
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
