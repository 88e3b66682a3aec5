//! Data Transfer Objects (DTOs) for the CONSIA gateway.
//!
//! DTOs are organized by protocol:
//! - `websocket`: room frames exchanged over WebSocket
//! - `http`: HTTP API request and response bodies

pub mod conversion;
pub mod http;
pub mod websocket;
