//! OpenAI 互換 HTTP API クライアント
//!
//! `AiProvider` と `SpeechProvider` の両方を実装します。
//!
//! - テキスト応答: `POST {base}/responses`
//! - 文字起こし: `POST {base}/audio/transcriptions` (multipart)
//! - 音声合成: `POST {base}/audio/speech`
//! - リアルタイム音声セッション: `POST {base}/realtime/sessions`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::domain::{
    AiProvider, AudioClip, Completion, EphemeralSession, ProviderError, SpeechProvider,
};

const NO_TEXT: &str = "(no text)";
const EMPTY_TRANSCRIPT: &str = "(empty transcript)";

/// Connection settings of the client
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    /// API root, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    pub api_key: Option<String>,
    pub transcribe_model: String,
    pub tts_model: String,
    pub timeout: Duration,
}

pub struct OpenAiClient {
    http: reqwest::Client,
    settings: OpenAiSettings,
}

impl OpenAiClient {
    pub fn new(settings: OpenAiSettings) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self { http, settings })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.settings
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ProviderError::NotConfigured("OPENAI_API_KEY is not set".to_string()))
    }

    /// Send and fail on non-2xx, keeping the provider's error body as detail
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let response = request
            .bearer_auth(self.api_key()?)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "Provider returned an error status");
        Err(ProviderError::Status {
            status: status.as_u16(),
            detail,
        })
    }

    async fn send_json(&self, request: reqwest::RequestBuilder) -> Result<Value, ProviderError> {
        self.send(request)
            .await?
            .json::<Value>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

fn map_transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Transport(error.to_string())
    }
}

/// Text of a `/responses` answer: `output_text`, else the concatenated text
/// parts of the first output item, else a placeholder
fn extract_output_text(body: &Value) -> String {
    if let Some(text) = body.get("output_text").and_then(Value::as_str)
        && !text.is_empty()
    {
        return text.to_string();
    }
    let joined: String = body
        .pointer("/output/0/content")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if joined.is_empty() {
        NO_TEXT.to_string()
    } else {
        joined
    }
}

/// Total tokens reported by the provider; input + output when no total is given
fn extract_total_tokens(body: &Value) -> u64 {
    let Some(usage) = body.get("usage") else {
        return 0;
    };
    if let Some(total) = usage.get("total_tokens").and_then(Value::as_u64) {
        return total;
    }
    let input = usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0);
    let output = usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0);
    input + output
}

fn audio_content_type(format: &str) -> &'static str {
    match format {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "opus" => "audio/ogg",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "pcm" => "audio/pcm",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Deserialize)]
struct RealtimeSessionBody {
    client_secret: ClientSecret,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    voice: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
    #[serde(default)]
    expires_at: i64,
}

#[async_trait]
impl AiProvider for OpenAiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        model: &str,
    ) -> Result<Completion, ProviderError> {
        let payload = json!({
            "model": model,
            "input": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_message },
            ],
        });
        let body = self
            .send_json(self.http.post(self.url("responses")).json(&payload))
            .await?;
        Ok(Completion {
            text: extract_output_text(&body),
            model: body
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(model)
                .to_string(),
            tokens: extract_total_tokens(&body),
        })
    }
}

#[async_trait]
impl SpeechProvider for OpenAiClient {
    async fn create_ephemeral_session(
        &self,
        model: &str,
        voice: &str,
    ) -> Result<EphemeralSession, ProviderError> {
        let payload = json!({ "model": model, "voice": voice });
        let response = self
            .send(self.http.post(self.url("realtime/sessions")).json(&payload))
            .await?;
        let body: RealtimeSessionBody = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(EphemeralSession {
            session_token: body.client_secret.value,
            expires_at: body.client_secret.expires_at,
            model: body.model.unwrap_or_else(|| model.to_string()),
            voice: body.voice.unwrap_or_else(|| voice.to_string()),
        })
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        format: &str,
    ) -> Result<AudioClip, ProviderError> {
        let payload = json!({
            "model": self.settings.tts_model,
            "input": text,
            "voice": voice,
            "response_format": format,
        });
        let response = self
            .send(self.http.post(self.url("audio/speech")).json(&payload))
            .await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_else(|| audio_content_type(format))
            .to_string();
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        Ok(AudioClip {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<String, ProviderError> {
        let file = Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str(content_type)
            .map_err(|e| ProviderError::InvalidResponse(format!("invalid audio type: {e}")))?;
        let form = Form::new()
            .text("model", self.settings.transcribe_model.clone())
            .part("file", file);
        let body = self
            .send_json(self.http.post(self.url("audio/transcriptions")).multipart(form))
            .await?;
        let text = body
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim();
        Ok(if text.is_empty() {
            EMPTY_TRANSCRIPT.to_string()
        } else {
            text.to_string()
        })
    }
}
