//! Shared utilities for the CONSIA workspace.
//!
//! - `logger`: tracing subscriber bootstrap
//! - `time`: clock abstraction, day stamps and RFC 3339 formatting

pub mod logger;
pub mod time;
