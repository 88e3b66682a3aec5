//! API error responses.
//!
//! Every failure leaves the gateway as `{"ok": false, "error": <kind>, ...}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

use crate::{
    domain::{Dimension, ProviderError},
    usecase::{
        AdminError, AdmissionError, AiUseCaseError, GetRoomDetailError, JoinRoomError, VaultError,
    },
};

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("owner credentials required")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("limit exceeded on '{0}'")]
    LimitExceeded(Dimension),

    #[error("too many requests")]
    RateLimited,

    #[error("{0}")]
    Provider(String),

    #[error("provider timed out")]
    ProviderTimeout,

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::LimitExceeded(_) | ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Provider(_) => StatusCode::BAD_GATEWAY,
            ApiError::ProviderTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::LimitExceeded(_) => "limit_exceeded",
            ApiError::RateLimited => "rate_limited",
            ApiError::Provider(_) => "provider_error",
            ApiError::ProviderTimeout => "provider_timeout",
            ApiError::Internal(_) => "internal_error",
        }
    }

    pub fn body(&self) -> Value {
        let mut body = json!({
            "ok": false,
            "error": self.kind(),
            "message": self.to_string(),
        });
        if let ApiError::LimitExceeded(dimension) = self {
            body["dimension"] = json!(dimension);
        }
        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "{}", self);
        }
        (status, Json(self.body())).into_response()
    }
}

impl From<ProviderError> for ApiError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Timeout => ApiError::ProviderTimeout,
            ProviderError::NotConfigured(detail) => ApiError::Internal(detail),
            other => ApiError::Provider(other.to_string()),
        }
    }
}

impl From<AiUseCaseError> for ApiError {
    fn from(error: AiUseCaseError) -> Self {
        match error {
            AiUseCaseError::InvalidInput(message) => ApiError::BadRequest(message),
            AiUseCaseError::Rejected(dimension) => ApiError::LimitExceeded(dimension),
            AiUseCaseError::Provider(e) => e.into(),
            AiUseCaseError::Ledger(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JoinRoomError> for ApiError {
    fn from(error: JoinRoomError) -> Self {
        match error {
            JoinRoomError::InvalidRoomName(e) => ApiError::BadRequest(e.to_string()),
            JoinRoomError::Rejected(dimension) => ApiError::LimitExceeded(dimension),
            JoinRoomError::Ledger(e) => ApiError::Internal(e.to_string()),
            JoinRoomError::Room(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<GetRoomDetailError> for ApiError {
    fn from(error: GetRoomDetailError) -> Self {
        match error {
            GetRoomDetailError::InvalidRoomName(e) => ApiError::BadRequest(e.to_string()),
            GetRoomDetailError::RoomNotFound(_) => ApiError::NotFound(error.to_string()),
            GetRoomDetailError::Rejected(dimension) => ApiError::LimitExceeded(dimension),
            GetRoomDetailError::Ledger(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<AdmissionError> for ApiError {
    fn from(error: AdmissionError) -> Self {
        match error {
            AdmissionError::Rejected(dimension) => ApiError::LimitExceeded(dimension),
            AdmissionError::Ledger(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<AdminError> for ApiError {
    fn from(error: AdminError) -> Self {
        ApiError::Internal(error.to_string())
    }
}

impl From<VaultError> for ApiError {
    fn from(error: VaultError) -> Self {
        match error {
            VaultError::InvalidKey => ApiError::BadRequest(error.to_string()),
            VaultError::NotFound(_) => ApiError::NotFound(error.to_string()),
            VaultError::Corrupted(_) | VaultError::Store(_) => ApiError::Internal(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn render(error: ApiError) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_limit_exceeded_carries_dimension() {
        // テスト項目: 429 応答に超過した次元が含まれる
        let (status, body) = render(ApiError::LimitExceeded(Dimension::GlobalBudget)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "limit_exceeded");
        assert_eq!(body["dimension"], "globalBudget");
    }

    #[test]
    fn test_provider_errors_map_to_gateway_statuses() {
        // テスト項目: プロバイダのタイムアウトは 504、その他の失敗は 502
        assert_eq!(
            ApiError::from(ProviderError::Timeout).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::from(ProviderError::Transport("reset".to_string())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(AiUseCaseError::InvalidInput("Missing 'message'".to_string())).kind(),
            "bad_request"
        );
    }

    #[tokio::test]
    async fn test_every_error_is_structured_json() {
        // テスト項目: すべてのエラーが ok=false と error 種別を持つ JSON になる
        for error in [
            ApiError::BadRequest("x".to_string()),
            ApiError::Unauthorized("x".to_string()),
            ApiError::Forbidden,
            ApiError::NotFound("x".to_string()),
            ApiError::RateLimited,
            ApiError::Provider("x".to_string()),
            ApiError::ProviderTimeout,
            ApiError::Internal("x".to_string()),
        ] {
            let kind = error.kind();
            let (_, body) = render(error).await;
            assert_eq!(body["ok"], false);
            assert_eq!(body["error"], kind);
        }
    }
}
