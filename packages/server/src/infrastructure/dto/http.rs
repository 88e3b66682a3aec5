//! HTTP API DTOs.

use serde::{Deserialize, Serialize};

use crate::domain::AuditEntry;

/// `GET /health` and `GET /`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDto {
    pub ok: bool,
    pub service: String,
    pub ts: String,
}

/// `POST /ask` request body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    pub ok: bool,
    /// The trimmed question, echoed back
    pub message: String,
    pub reply: String,
    pub model: String,
}

/// `POST /voice` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceAskResponse {
    pub ok: bool,
    pub transcript: String,
    pub reply: String,
    pub model: String,
}

/// `POST /voice/session` request body; every field optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoiceSessionRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSessionResponse {
    pub ok: bool,
    pub session_token: String,
    pub expires_at: Option<String>,
    pub model: String,
    pub voice: String,
}

/// `POST /voice/tts` request body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TtsRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

/// Room list entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummaryDto {
    pub room: String,
    pub member_count: usize,
    pub created_at: String,
    pub uptime_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberDetailDto {
    pub connection_id: String,
    pub identity: String,
    pub joined_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDetailDto {
    pub room: String,
    pub member_count: usize,
    pub members: Vec<MemberDetailDto>,
    pub created_at: String,
    pub uptime_ms: i64,
}

/// One row of `GET /admin/metrics`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRowDto {
    pub identity: String,
    pub plan: String,
    pub requests: u64,
    pub ai_calls: u64,
    pub voice_sessions: u64,
    pub tts_chars: u64,
    pub spend: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsDto {
    pub ok: bool,
    pub day: String,
    pub totals: UsageRowDto,
    pub usage: Vec<UsageRowDto>,
    pub global_spend: f64,
    pub global_budget: Option<f64>,
    pub recent_audit: Vec<AuditEntry>,
}

/// `GET /admin/audit/verify`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditVerifyDto {
    pub ok: bool,
    pub verified: bool,
    pub entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `PUT /vault/{key}` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultWriteDto {
    pub ok: bool,
    pub key: String,
    pub bytes: usize,
}
