//! Voice endpoint handlers.

use std::sync::Arc;

use axum::{
    Extension,
    body::Bytes,
    extract::{Multipart, State, multipart::MultipartRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use consia_shared::time::timestamp_to_rfc3339;

use crate::{
    domain::AuthContext,
    infrastructure::dto::http::{
        TtsRequest, VoiceAskResponse, VoiceSessionRequest, VoiceSessionResponse,
    },
    ui::{error::ApiError, state::AppState},
    usecase::AudioUpload,
};

use super::http::{idempotency_key, idempotent, to_json};

const DEFAULT_AUDIO_NAME: &str = "audio.webm";
const DEFAULT_AUDIO_TYPE: &str = "audio/webm";

/// Pull the `file` field out of a multipart form
async fn read_audio(multipart: Result<Multipart, MultipartRejection>) -> Result<AudioUpload, ApiError> {
    let mut multipart = multipart.map_err(|_| {
        ApiError::BadRequest("Expected multipart/form-data with file=<audio>".to_string())
    })?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or(DEFAULT_AUDIO_NAME).to_string();
        let content_type = field.content_type().unwrap_or(DEFAULT_AUDIO_TYPE).to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        return Ok(AudioUpload {
            bytes: bytes.to_vec(),
            filename,
            content_type,
        });
    }
    Err(ApiError::BadRequest(
        "Missing audio file field 'file'".to_string(),
    ))
}

/// `POST /voice`: transcribe, then answer
pub async fn voice_ask(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let key = idempotency_key(&headers)?;
    let upload = read_audio(multipart).await?;

    idempotent(&state, &auth, "/voice", key, async {
        let outcome = state.voice_ask_usecase.execute(&auth, upload).await?;
        to_json(&VoiceAskResponse {
            ok: true,
            transcript: outcome.transcript,
            reply: outcome.reply,
            model: outcome.model,
        })
    })
    .await
}

/// `POST /voice/session` and `POST /voice/token`
pub async fn voice_session(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: VoiceSessionRequest = serde_json::from_slice(&body).unwrap_or_default();
    let session = state
        .voice_session_usecase
        .execute(&auth, request.model, request.voice)
        .await?;

    let expires_at = (session.expires_at > 0).then(|| timestamp_to_rfc3339(session.expires_at * 1000));
    let body = to_json(&VoiceSessionResponse {
        ok: true,
        session_token: session.session_token,
        expires_at,
        model: session.model,
        voice: session.voice,
    })?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
        .into_response())
}

/// `POST /voice/tts`: returns the audio bytes
pub async fn synthesize_speech(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: TtsRequest = serde_json::from_slice(&body).unwrap_or_default();
    let clip = state
        .synthesize_speech_usecase
        .execute(&auth, request.text, request.voice, request.format)
        .await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, clip.content_type),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        clip.bytes,
    )
        .into_response())
}
