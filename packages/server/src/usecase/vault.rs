//! UseCase: Vault (`GET|PUT|DELETE /vault/{key}`)
//!
//! オーナー専用の不透明なバイト列ストア。値は base64 で KeyValueStore に保存されます。
//! 認可（オーナーであること）は UI 層のミドルウェアで確認済みである前提です。

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use consia_shared::time::Clock;
use serde_json::json;

use crate::{
    domain::{AuditEvent, AuditKind, AuthContext, KeyValueStore, Timestamp},
    infrastructure::AuditRecorder,
};

use super::error::VaultError;

pub const MAX_VAULT_KEY_LEN: usize = 128;

const VAULT_PREFIX: &str = "vault:";

/// Keys are 1..=128 characters of `[A-Za-z0-9._-]`
pub fn valid_vault_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_VAULT_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn storage_key(key: &str) -> String {
    format!("{VAULT_PREFIX}{key}")
}

pub struct VaultUseCase {
    store: Arc<dyn KeyValueStore>,
    audit: AuditRecorder,
    clock: Arc<dyn Clock>,
}

impl VaultUseCase {
    pub fn new(store: Arc<dyn KeyValueStore>, audit: AuditRecorder, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            audit,
            clock,
        }
    }

    fn checked(key: &str) -> Result<(), VaultError> {
        if valid_vault_key(key) {
            Ok(())
        } else {
            Err(VaultError::InvalidKey)
        }
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>, VaultError> {
        Self::checked(key)?;
        let encoded = self
            .store
            .get(&storage_key(key))
            .await?
            .ok_or_else(|| VaultError::NotFound(key.to_string()))?;
        STANDARD.decode(encoded).map_err(|e| {
            tracing::error!(key, "Undecodable vault entry: {}", e);
            VaultError::Corrupted(key.to_string())
        })
    }

    /// Store `bytes` under `key`, replacing any previous value. Returns the stored size.
    pub async fn put(&self, auth: &AuthContext, key: &str, bytes: &[u8]) -> Result<usize, VaultError> {
        Self::checked(key)?;
        self.store
            .put(&storage_key(key), STANDARD.encode(bytes), None)
            .await?;
        self.audit.record(AuditEvent::new(
            Timestamp::new(self.clock.now_millis()),
            AuditKind::VaultWrite,
            auth.identity.key(),
            json!({ "key": key, "bytes": bytes.len() }),
        ));
        Ok(bytes.len())
    }

    /// Absent keys are [`VaultError::NotFound`]
    pub async fn delete(&self, auth: &AuthContext, key: &str) -> Result<(), VaultError> {
        Self::checked(key)?;
        let storage_key = storage_key(key);
        if self.store.get(&storage_key).await?.is_none() {
            return Err(VaultError::NotFound(key.to_string()));
        }
        self.store.delete(&storage_key).await?;
        self.audit.record(AuditEvent::new(
            Timestamp::new(self.clock.now_millis()),
            AuditKind::VaultDelete,
            auth.identity.key(),
            json!({ "key": key }),
        ));
        Ok(())
    }
}
