//! Owner-only vault handlers.

use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::{
    domain::AuthContext,
    infrastructure::dto::http::VaultWriteDto,
    ui::{error::ApiError, state::AppState},
};

/// `GET /vault/{key}`
pub async fn vault_get(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let bytes = state.vault_usecase.get(&key).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        bytes,
    )
        .into_response())
}

/// `PUT /vault/{key}`
pub async fn vault_put(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Json<VaultWriteDto>, ApiError> {
    let bytes = state.vault_usecase.put(&auth, &key, &body).await?;
    Ok(Json(VaultWriteDto {
        ok: true,
        key,
        bytes,
    }))
}

/// `DELETE /vault/{key}`
pub async fn vault_delete(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.vault_usecase.delete(&auth, &key).await?;
    Ok(Json(json!({ "ok": true, "key": key })))
}
