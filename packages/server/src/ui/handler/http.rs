//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use consia_shared::time::timestamp_to_rfc3339;
use serde::Serialize;

use crate::{
    domain::AuthContext,
    infrastructure::{
        IdempotentOutcome,
        dto::http::{AskRequest, AskResponse, HealthDto, RoomDetailDto, RoomSummaryDto},
        idempotency::valid_idempotency_key,
    },
    ui::{error::ApiError, state::AppState},
};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
/// Set to `true` on responses served from the idempotency cache
pub const IDEMPOTENT_REPLAY_HEADER: &str = "x-idempotent-replay";

/// Health check endpoint, also served at `/`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthDto> {
    Json(HealthDto {
        ok: true,
        service: state.service.clone(),
        ts: timestamp_to_rfc3339(state.clock.now_millis()),
    })
}

/// Client idempotency key, validated
pub(super) fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .filter(|key| valid_idempotency_key(key))
        .map(|key| Some(key.to_string()))
        .ok_or_else(|| ApiError::BadRequest("invalid Idempotency-Key header".to_string()))
}

pub(super) fn to_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string(value).map_err(|e| ApiError::Internal(e.to_string()))
}

pub(super) fn json_response(outcome: IdempotentOutcome) -> Response {
    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
        outcome.body.to_string(),
    )
        .into_response();
    if outcome.replayed {
        response
            .headers_mut()
            .insert(IDEMPOTENT_REPLAY_HEADER, HeaderValue::from_static("true"));
    }
    response
}

/// Run `operation` through the idempotency cache when the client sent a key
pub(super) async fn idempotent<F>(
    state: &AppState,
    auth: &AuthContext,
    route: &str,
    key: Option<String>,
    operation: F,
) -> Result<Response, ApiError>
where
    F: Future<Output = Result<String, ApiError>>,
{
    let outcome = match key {
        Some(key) => {
            state
                .idempotency
                .run(&auth.identity.key(), route, &key, operation)
                .await?
        }
        None => IdempotentOutcome {
            body: operation.await?.into(),
            replayed: false,
        },
    };
    Ok(json_response(outcome))
}

/// `POST /ask`
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let key = idempotency_key(&headers)?;
    // Unparseable bodies behave like a missing message
    let request: AskRequest = serde_json::from_slice(&body).unwrap_or_default();

    idempotent(&state, &auth, "/ask", key, async {
        let outcome = state.ask_usecase.execute(&auth, request.message).await?;
        to_json(&AskResponse {
            ok: true,
            message: outcome.message,
            reply: outcome.reply,
            model: outcome.model,
        })
    })
    .await
}

/// Get list of rooms
pub async fn get_rooms(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<RoomSummaryDto>>, ApiError> {
    let rooms = state.get_rooms_usecase.execute(&auth).await?;

    // Domain Model から DTO への変換
    Ok(Json(rooms.iter().map(RoomSummaryDto::from).collect()))
}

/// Get room detail by name
pub async fn get_room_detail(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(name): Path<String>,
) -> Result<Json<RoomDetailDto>, ApiError> {
    let room = state.get_room_detail_usecase.execute(&auth, name).await?;
    Ok(Json(RoomDetailDto::from(room)))
}
