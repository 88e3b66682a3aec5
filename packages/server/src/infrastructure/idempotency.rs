//! 冪等キーのレスポンスキャッシュ
//!
//! 同じ (identity, route, key) で届いたリクエストには、最初に成功した
//! レスポンス本文をそのまま返します。失敗はキャッシュされないため、
//! 同じキーで再試行できます。並行に届いた重複リクエストは 1 回の実行に
//! 合流します。

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use moka::future::Cache;

/// Longest accepted client-supplied key, in bytes
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Cached or freshly produced response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotentOutcome {
    /// Serialized JSON body, byte-identical across replays
    pub body: Arc<str>,
    pub replayed: bool,
}

pub struct IdempotencyCache {
    cache: Cache<String, Arc<str>>,
}

impl IdempotencyCache {
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    fn cache_key(identity: &str, route: &str, key: &str) -> String {
        format!("{identity}\n{route}\n{key}")
    }

    /// Run `operation` unless a successful body for the key is cached.
    ///
    /// `operation` runs at most once per live key; concurrent callers with
    /// the same key wait for it and receive its body.
    pub async fn run<F, E>(
        &self,
        identity: &str,
        route: &str,
        key: &str,
        operation: F,
    ) -> Result<IdempotentOutcome, E>
    where
        F: Future<Output = Result<String, E>>,
        E: Clone + Send + Sync + 'static,
    {
        let executed = AtomicBool::new(false);
        let body = self
            .cache
            .try_get_with(Self::cache_key(identity, route, key), async {
                executed.store(true, Ordering::SeqCst);
                operation.await.map(Arc::<str>::from)
            })
            .await
            .map_err(|e| (*e).clone())?;

        let replayed = !executed.load(Ordering::SeqCst);
        if replayed {
            tracing::debug!(identity, route, "Replaying cached idempotent response");
        }
        Ok(IdempotentOutcome { body, replayed })
    }
}

/// Accept a client key only when it is non-blank printable ASCII of bounded length
pub fn valid_idempotency_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_IDEMPOTENCY_KEY_LEN
        && key.bytes().all(|b| b.is_ascii_graphic())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn create_cache() -> IdempotencyCache {
        IdempotencyCache::new(Duration::from_secs(60), 100)
    }

    #[tokio::test]
    async fn test_second_call_replays_without_running() {
        // テスト項目: 同じキーの 2 回目は処理を実行せず同じ本文を返す
        // given (前提条件):
        let cache = create_cache();
        let calls = AtomicUsize::new(0);
        let op = || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(format!(r#"{{"n":{n}}}"#))
        };

        // when (操作):
        let first = cache.run("owner", "/ask", "k1", op()).await.unwrap();
        let second = cache.run("owner", "/ask", "k1", op()).await.unwrap();

        // then (期待する結果):
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.body, second.body);
        assert!(!first.replayed);
        assert!(second.replayed);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        // テスト項目: 失敗した結果はキャッシュされず、同じキーで再実行できる
        // given (前提条件):
        let cache = create_cache();

        // when (操作):
        let failed = cache
            .run("owner", "/ask", "k1", async { Err::<String, _>("boom".to_string()) })
            .await;
        let retried = cache
            .run("owner", "/ask", "k1", async { Ok::<_, String>("ok".to_string()) })
            .await;

        // then (期待する結果):
        assert_eq!(failed, Err("boom".to_string()));
        assert_eq!(&*retried.unwrap().body, "ok");
    }

    #[tokio::test]
    async fn test_keys_are_scoped_by_identity_and_route() {
        // テスト項目: 別の identity や route では同じキーでも別扱いになる
        // given (前提条件):
        let cache = create_cache();
        cache
            .run("device:a", "/ask", "k1", async { Ok::<_, String>("a".to_string()) })
            .await
            .unwrap();

        // when (操作):
        let other_identity = cache
            .run("device:b", "/ask", "k1", async { Ok::<_, String>("b".to_string()) })
            .await
            .unwrap();
        let other_route = cache
            .run("device:a", "/voice", "k1", async { Ok::<_, String>("v".to_string()) })
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(&*other_identity.body, "b");
        assert_eq!(&*other_route.body, "v");
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_run_once() {
        // テスト項目: 並行に届いた同じキーのリクエストは 1 回だけ実行される
        // given (前提条件):
        let cache = Arc::new(create_cache());
        let calls = Arc::new(AtomicUsize::new(0));

        // when (操作):
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .run("owner", "/ask", "same", async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, String>("body".to_string())
                    })
                    .await
                    .unwrap()
            }));
        }
        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap());
        }

        // then (期待する結果):
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcomes.iter().filter(|o| !o.replayed).count(), 1);
        assert!(outcomes.iter().all(|o| &*o.body == "body"));
    }

    #[test]
    fn test_key_validation() {
        assert!(valid_idempotency_key("req-123_abc"));
        assert!(!valid_idempotency_key(""));
        assert!(!valid_idempotency_key("has space"));
        assert!(!valid_idempotency_key(&"x".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1)));
    }
}
