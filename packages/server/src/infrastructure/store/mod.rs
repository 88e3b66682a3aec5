//! KeyValueStore 実装
//!
//! - `inmemory`: 単一インスタンス / 開発用のプロセス内マップ
//! - `redis`: 永続化用の外部 KV（`redis-store` feature）
//! - `lock`: ストア上のリースキーによるキー単位のロック

pub mod inmemory;
pub mod lock;
#[cfg(feature = "redis-store")]
pub mod redis;

pub use inmemory::InMemoryStore;
pub use lock::{KeyLock, KeyLocks};
#[cfg(feature = "redis-store")]
pub use self::redis::RedisStore;
