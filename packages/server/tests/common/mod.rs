//! Shared fixtures for the gateway integration tests.

#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use axum::{Router, body::Body, response::Response};
use consia_server::{
    config::{AppConfig, ClientCredential},
    domain::{
        AiProvider, AudioClip, Completion, EphemeralSession, PlanTier, ProviderError,
        SpeechProvider,
    },
    infrastructure::InMemoryStore,
    ui::{AppState, build_router},
};
use consia_shared::time::{Clock, FixedClock};
use http_body_util::BodyExt;
use serde_json::Value;

pub const NOW_MILLIS: i64 = 1_714_521_600_000;
pub const OWNER_SECRET: &str = "owner-secret";
pub const DEVICE_SECRET: &str = "device-secret";
pub const SERVICE_ID: &str = "svc";
pub const SERVICE_SECRET: &str = "svc-secret";

/// Deterministic provider that never leaves the process
#[derive(Default)]
pub struct FakeProvider {
    pub completions: AtomicUsize,
    pub fail: AtomicBool,
}

impl FakeProvider {
    fn check(&self) -> Result<(), ProviderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Status {
                status: 500,
                detail: "upstream exploded".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AiProvider for FakeProvider {
    async fn complete(
        &self,
        _system_prompt: &str,
        user_message: &str,
        model: &str,
    ) -> Result<Completion, ProviderError> {
        self.check()?;
        self.completions.fetch_add(1, Ordering::SeqCst);
        Ok(Completion {
            text: format!("echo: {user_message}"),
            model: model.to_string(),
            tokens: 100,
        })
    }
}

#[async_trait]
impl SpeechProvider for FakeProvider {
    async fn create_ephemeral_session(
        &self,
        model: &str,
        voice: &str,
    ) -> Result<EphemeralSession, ProviderError> {
        self.check()?;
        Ok(EphemeralSession {
            session_token: "ek_test".to_string(),
            expires_at: NOW_MILLIS / 1000 + 60,
            model: model.to_string(),
            voice: voice.to_string(),
        })
    }

    async fn synthesize(
        &self,
        text: &str,
        _voice: &str,
        format: &str,
    ) -> Result<AudioClip, ProviderError> {
        self.check()?;
        Ok(AudioClip {
            bytes: text.as_bytes().to_vec(),
            content_type: format!("audio/{format}"),
        })
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        _filename: &str,
        _content_type: &str,
    ) -> Result<String, ProviderError> {
        self.check()?;
        Ok(String::from_utf8_lossy(&audio).into_owned())
    }
}

/// Owner, one FREE device, one PRO HMAC service, anonymous callers allowed
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.owner_secret = Some(OWNER_SECRET.to_string());
    config.auth.devices.push(ClientCredential {
        id: "phone".to_string(),
        secret: DEVICE_SECRET.to_string(),
        plan: PlanTier::Free,
    });
    config.auth.hmac_clients.push(ClientCredential {
        id: SERVICE_ID.to_string(),
        secret: SERVICE_SECRET.to_string(),
        plan: PlanTier::Pro,
    });
    config.auth.anonymous.allowed = true;
    config
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub provider: Arc<FakeProvider>,
}

pub fn test_app(config: AppConfig) -> TestApp {
    let provider = Arc::new(FakeProvider::default());
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(NOW_MILLIS));
    let (state, _audit_task) = AppState::from_config(
        &config,
        Arc::new(InMemoryStore::new()),
        provider.clone(),
        provider.clone(),
        clock,
    );
    let state = Arc::new(state);
    TestApp {
        router: build_router(state.clone()),
        state,
        provider,
    }
}

/// Serve `config` on an ephemeral port
pub async fn spawn_server(config: AppConfig) -> (SocketAddr, Arc<AppState>) {
    let app = test_app(config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    (addr, app.state)
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
