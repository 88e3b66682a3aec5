//! AI / 音声プロバイダの実装
//!
//! - `openai`: OpenAI 互換 HTTP API を使った実装

pub mod openai;

pub use openai::{OpenAiClient, OpenAiSettings};
