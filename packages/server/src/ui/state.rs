//! Shared application state.

use std::{sync::Arc, time::Duration};

use consia_shared::time::Clock;
use tokio::task::JoinHandle;

use crate::{
    config::AppConfig,
    domain::{AiProvider, AuditLog, KeyValueStore, RoomHub, SpeechProvider},
    infrastructure::{
        ActorRoomHub, AuditRecorder, IdempotencyCache, PresencePublisher, StoreAuditLog,
        UsageLedger,
    },
    usecase::{
        AdminMetricsUseCase, AdmissionController, AskUseCase, GetRoomDetailUseCase,
        GetRoomsUseCase, JoinRoomUseCase, LeaveRoomUseCase, RelayMessageUseCase,
        SynthesizeSpeechUseCase, VaultUseCase, VoiceAskUseCase, VoiceSessionUseCase,
    },
};

use super::middleware::{Authenticator, CorsPolicy, IdentityRateLimiter};

/// Name reported by the health endpoint
pub const SERVICE_NAME: &str = "consia-core";

/// Shared application state
pub struct AppState {
    pub service: String,
    /// JoinRoomUseCase（ルーム参加のユースケース）
    pub join_room_usecase: Arc<JoinRoomUseCase>,
    /// RelayMessageUseCase（メッセージ中継のユースケース）
    pub relay_message_usecase: Arc<RelayMessageUseCase>,
    /// LeaveRoomUseCase（ルーム退出のユースケース）
    pub leave_room_usecase: Arc<LeaveRoomUseCase>,
    /// GetRoomsUseCase（ルーム一覧取得のユースケース）
    pub get_rooms_usecase: Arc<GetRoomsUseCase>,
    /// GetRoomDetailUseCase（ルーム詳細取得のユースケース）
    pub get_room_detail_usecase: Arc<GetRoomDetailUseCase>,
    pub ask_usecase: Arc<AskUseCase>,
    pub voice_ask_usecase: Arc<VoiceAskUseCase>,
    pub voice_session_usecase: Arc<VoiceSessionUseCase>,
    pub synthesize_speech_usecase: Arc<SynthesizeSpeechUseCase>,
    pub admin_metrics_usecase: Arc<AdminMetricsUseCase>,
    pub vault_usecase: Arc<VaultUseCase>,
    pub idempotency: Arc<IdempotencyCache>,
    pub authenticator: Arc<Authenticator>,
    /// `None` when rate limiting is disabled
    pub rate_limiter: Option<Arc<IdentityRateLimiter>>,
    pub cors: CorsPolicy,
    pub audit: AuditRecorder,
    pub clock: Arc<dyn Clock>,
    /// Server-initiated WebSocket ping period
    pub ping_interval: Duration,
}

impl AppState {
    /// Wire every use case from `config` on top of the given adapters.
    ///
    /// Must run inside a Tokio runtime: the audit writer task is spawned here
    /// and its handle returned.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn KeyValueStore>,
        ai: Arc<dyn AiProvider>,
        speech: Arc<dyn SpeechProvider>,
        clock: Arc<dyn Clock>,
    ) -> (Self, JoinHandle<()>) {
        // 1. Bookkeeping
        let ledger = Arc::new(UsageLedger::new(store.clone(), config.usage_retention()));
        let audit_log: Arc<dyn AuditLog> =
            Arc::new(StoreAuditLog::new(store.clone(), config.audit.max_entries));
        let (audit, audit_task) = AuditRecorder::spawn(audit_log.clone());
        let admission = Arc::new(AdmissionController::new(
            ledger.clone(),
            config.plan_table(),
            config.global_budget(),
            clock.clone(),
            audit.clone(),
        ));

        // 2. Room hub
        let (presence, _presence_task) = PresencePublisher::spawn(store.clone());
        let hub: Arc<dyn RoomHub> = Arc::new(
            ActorRoomHub::new(config.room_hub_settings(), clock.clone()).with_presence(presence),
        );
        let max_name_len = config.rooms.max_name_len;

        // 3. UseCases
        let ai_settings = config.ai_settings();
        let pricing = config.pricing;
        let state = Self {
            service: SERVICE_NAME.to_string(),
            join_room_usecase: Arc::new(JoinRoomUseCase::new(
                hub.clone(),
                admission.clone(),
                audit.clone(),
                clock.clone(),
                max_name_len,
            )),
            relay_message_usecase: Arc::new(RelayMessageUseCase::new(hub.clone())),
            leave_room_usecase: Arc::new(LeaveRoomUseCase::new(
                hub.clone(),
                audit.clone(),
                clock.clone(),
            )),
            get_rooms_usecase: Arc::new(GetRoomsUseCase::new(hub.clone(), admission.clone())),
            get_room_detail_usecase: Arc::new(GetRoomDetailUseCase::new(
                hub,
                admission.clone(),
                max_name_len,
            )),
            ask_usecase: Arc::new(AskUseCase::new(
                ai.clone(),
                admission.clone(),
                pricing,
                ai_settings.clone(),
                audit.clone(),
                clock.clone(),
            )),
            voice_ask_usecase: Arc::new(VoiceAskUseCase::new(
                ai,
                speech.clone(),
                admission.clone(),
                pricing,
                ai_settings.clone(),
                audit.clone(),
                clock.clone(),
            )),
            voice_session_usecase: Arc::new(VoiceSessionUseCase::new(
                speech.clone(),
                admission.clone(),
                pricing,
                ai_settings.clone(),
                audit.clone(),
                clock.clone(),
            )),
            synthesize_speech_usecase: Arc::new(SynthesizeSpeechUseCase::new(
                speech,
                admission,
                pricing,
                ai_settings,
                audit.clone(),
                clock.clone(),
            )),
            admin_metrics_usecase: Arc::new(AdminMetricsUseCase::new(
                ledger,
                audit_log,
                config.global_budget(),
                config.audit.recent_in_metrics,
                clock.clone(),
            )),
            vault_usecase: Arc::new(VaultUseCase::new(store, audit.clone(), clock.clone())),

            // 4. Gateway
            idempotency: Arc::new(IdempotencyCache::new(
                Duration::from_secs(config.idempotency.ttl_secs),
                config.idempotency.capacity,
            )),
            authenticator: Arc::new(Authenticator::new(&config.auth, clock.clone())),
            rate_limiter: IdentityRateLimiter::per_minute(config.rate_limit.requests_per_minute)
                .map(Arc::new),
            cors: CorsPolicy::new(&config.cors.allow_origins),
            audit,
            clock,
            ping_interval: Duration::from_secs(config.rooms.ping_interval_secs),
        };
        (state, audit_task)
    }
}
