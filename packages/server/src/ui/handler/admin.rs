//! Owner-only admin handlers.

use std::sync::Arc;

use axum::{Json, extract::State};

use crate::{
    infrastructure::dto::http::{AuditVerifyDto, MetricsDto, UsageRowDto},
    ui::{error::ApiError, state::AppState},
};

/// `GET /admin/metrics`
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<Json<MetricsDto>, ApiError> {
    let report = state.admin_metrics_usecase.metrics().await?;

    let usage: Vec<UsageRowDto> = report
        .rows
        .iter()
        .map(|(key, record)| UsageRowDto::from((key, record)))
        .collect();
    let totals = UsageRowDto {
        identity: "*".to_string(),
        plan: "*".to_string(),
        requests: report.totals.requests,
        ai_calls: report.totals.ai_calls,
        voice_sessions: report.totals.voice_sessions,
        tts_chars: report.totals.tts_chars,
        spend: report.totals.spend.as_units(),
    };
    tracing::debug!(day = %report.day, rows = usage.len(), "Metrics report built");

    Ok(Json(MetricsDto {
        ok: true,
        day: report.day,
        totals,
        usage,
        global_spend: report.global_spend.as_units(),
        global_budget: report.global_budget.map(|budget| budget.as_units()),
        recent_audit: report.recent_audit,
    }))
}

/// `GET /admin/audit/verify`
pub async fn audit_verify(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AuditVerifyDto>, ApiError> {
    let verification = state.admin_metrics_usecase.verify_audit().await?;
    Ok(Json(AuditVerifyDto {
        ok: true,
        verified: verification.verified,
        entries: verification.entries,
        error: verification.error,
    }))
}

