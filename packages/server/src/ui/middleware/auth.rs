//! Caller authentication.
//!
//! Accepted schemes, tried in order:
//! 1. HMAC-signed request (`x-consia-client`, `x-consia-timestamp`,
//!    `x-consia-nonce`, `x-consia-signature`)
//! 2. Static secret: `Authorization: Bearer <secret>`, `x-consia-key: <secret>`
//!    or, on the WebSocket upgrade routes only, `?token=<secret>` (browsers
//!    cannot set headers on upgrades)
//! 3. Anonymous fingerprint, when the policy allows it
//!
//! The resolved [`AuthContext`] is inserted into the request extensions.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use axum::{
    Extension,
    body::Body,
    extract::{ConnectInfo, Query, Request, State},
    http::{HeaderMap, Method, header},
    middleware::Next,
    response::Response,
};
use consia_shared::time::Clock;
use hmac::{Hmac, Mac};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use moka::future::Cache;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::{
    config::{AnonymousPolicy, AuthSection, ClientCredential},
    domain::{AuditEvent, AuditKind, AuthContext, Identity, PlanTier, Timestamp},
    ui::{MAX_BODY_BYTES, error::ApiError, state::AppState},
};

type HmacSha256 = Hmac<Sha256>;

pub const KEY_HEADER: &str = "x-consia-key";
pub const CLIENT_HEADER: &str = "x-consia-client";
pub const TIMESTAMP_HEADER: &str = "x-consia-timestamp";
pub const NONCE_HEADER: &str = "x-consia-nonce";
pub const SIGNATURE_HEADER: &str = "x-consia-signature";

const MAX_NONCE_LEN: usize = 128;
const NONCE_CACHE_CAPACITY: u64 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,

    #[error("invalid credentials")]
    InvalidSecret,

    #[error("unknown client '{0}'")]
    UnknownClient(String),

    #[error("malformed signature headers")]
    Malformed,

    #[error("request timestamp outside the accepted window")]
    Stale,

    #[error("signature mismatch")]
    BadSignature,

    #[error("nonce already used")]
    Replayed,

    #[error("signed request body is too large")]
    BodyTooLarge,
}

/// Canonical string covered by a request signature
fn signature_payload(
    method: &Method,
    path: &str,
    timestamp: &str,
    nonce: &str,
    body: &[u8],
) -> String {
    let body_hash = hex::encode(Sha256::digest(body));
    format!("{method}\n{path}\n{timestamp}\n{nonce}\n{body_hash}")
}

fn mac_for(secret: &str, payload: &str) -> Result<HmacSha256, AuthError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::Malformed)?;
    mac.update(payload.as_bytes());
    Ok(mac)
}

/// Hex signature a client sends in `x-consia-signature`
pub fn sign_request(
    secret: &str,
    method: &Method,
    path: &str,
    timestamp: &str,
    nonce: &str,
    body: &[u8],
) -> Result<String, AuthError> {
    let mac = mac_for(secret, &signature_payload(method, path, timestamp, nonce, body))?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn secrets_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Signature headers of one request
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub client: String,
    pub timestamp: String,
    pub nonce: String,
    pub signature: String,
}

impl SignedHeaders {
    /// `None` when the request carries no signature at all
    fn from_headers(headers: &HeaderMap) -> Option<Result<Self, AuthError>> {
        headers.get(SIGNATURE_HEADER)?;
        Some(Self::read(headers))
    }

    fn read(headers: &HeaderMap) -> Result<Self, AuthError> {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .ok_or(AuthError::Malformed)
        };
        Ok(Self {
            client: get(CLIENT_HEADER)?,
            timestamp: get(TIMESTAMP_HEADER)?,
            nonce: get(NONCE_HEADER)?,
            signature: get(SIGNATURE_HEADER)?,
        })
    }
}

pub struct Authenticator {
    owner_secret: Option<String>,
    devices: Vec<ClientCredential>,
    hmac_clients: Vec<ClientCredential>,
    freshness_window: Duration,
    anonymous: AnonymousPolicy,
    /// Nonces seen within twice the freshness window
    nonces: Cache<String, ()>,
    clock: Arc<dyn Clock>,
}

impl Authenticator {
    pub fn new(auth: &AuthSection, clock: Arc<dyn Clock>) -> Self {
        let freshness_window = auth.freshness_window();
        Self {
            owner_secret: auth.owner_secret.clone(),
            devices: auth.devices.clone(),
            hmac_clients: auth.hmac_clients.clone(),
            freshness_window,
            anonymous: auth.anonymous.clone(),
            nonces: Cache::builder()
                .max_capacity(NONCE_CACHE_CAPACITY)
                .time_to_live(freshness_window * 2)
                .build(),
            clock,
        }
    }

    /// Match a static secret against the owner and device secrets
    pub fn resolve_secret(&self, secret: &str) -> Result<AuthContext, AuthError> {
        if let Some(owner) = &self.owner_secret
            && secrets_match(secret, owner)
        {
            return Ok(AuthContext::new(Identity::Owner, PlanTier::Enterprise));
        }
        self.devices
            .iter()
            .find(|device| secrets_match(secret, &device.secret))
            .map(|device| {
                AuthContext::new(
                    Identity::Device {
                        id: device.id.clone(),
                    },
                    device.plan,
                )
            })
            .ok_or(AuthError::InvalidSecret)
    }

    pub fn knows_client(&self, client_id: &str) -> bool {
        self.hmac_clients.iter().any(|client| client.id == client_id)
    }

    /// Check freshness, signature and nonce of a signed request
    pub async fn verify_signed(
        &self,
        signed: &SignedHeaders,
        method: &Method,
        path: &str,
        body: &[u8],
    ) -> Result<AuthContext, AuthError> {
        let SignedHeaders {
            client: client_id,
            timestamp,
            nonce,
            signature,
        } = signed;
        let client = self
            .hmac_clients
            .iter()
            .find(|client| &client.id == client_id)
            .ok_or_else(|| AuthError::UnknownClient(client_id.clone()))?;

        let signed_at: i64 = timestamp.trim().parse().map_err(|_| AuthError::Malformed)?;
        let now = self.clock.now_millis() / 1000;
        if now.abs_diff(signed_at) > self.freshness_window.as_secs() {
            return Err(AuthError::Stale);
        }
        if nonce.is_empty() || nonce.len() > MAX_NONCE_LEN {
            return Err(AuthError::Malformed);
        }

        let provided = hex::decode(signature.trim()).map_err(|_| AuthError::Malformed)?;
        mac_for(
            &client.secret,
            &signature_payload(method, path, timestamp, nonce, body),
        )?
        .verify_slice(&provided)
        .map_err(|_| AuthError::BadSignature)?;

        let entry = self
            .nonces
            .entry(format!("{client_id}\n{nonce}"))
            .or_insert(())
            .await;
        if !entry.is_fresh() {
            return Err(AuthError::Replayed);
        }

        Ok(AuthContext::new(
            Identity::Service {
                id: client.id.clone(),
            },
            client.plan,
        ))
    }

    /// Fingerprint of an unauthenticated caller, if the policy admits them
    pub fn anonymous(&self, address: Option<IpAddr>, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        if !self.anonymous.allowed {
            return Err(AuthError::Missing);
        }
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let address = address.map(|ip| ip.to_string()).unwrap_or_default();
        let digest = Sha256::digest(format!("{address}|{user_agent}").as_bytes());
        let fingerprint = hex::encode(&digest[..8]);
        Ok(AuthContext::new(
            Identity::Anonymous { fingerprint },
            self.anonymous.plan,
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// WebSocket upgrade routes, the only ones that read `?token=`
fn accepts_query_token(path: &str) -> bool {
    path == "/ws" || path.starts_with("/room/")
}

/// Static secret from the headers, else from `?token=` on upgrade routes
fn extract_secret(request: &Request) -> Result<Option<String>, AuthError> {
    let headers = request.headers();
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value.to_str().map_err(|_| AuthError::Malformed)?;
        return value
            .strip_prefix("Bearer ")
            .map(|token| Some(token.trim().to_string()))
            .ok_or(AuthError::Malformed);
    }
    if let Some(value) = headers.get(KEY_HEADER) {
        let value = value.to_str().map_err(|_| AuthError::Malformed)?;
        return Ok(Some(value.trim().to_string()));
    }
    if !accepts_query_token(request.uri().path()) {
        return Ok(None);
    }
    let query = Query::<TokenQuery>::try_from_uri(request.uri())
        .map(|Query(query)| query)
        .unwrap_or_default();
    Ok(query.token.filter(|token| !token.is_empty()))
}

/// Peer address, falling back to the first `x-forwarded-for` hop
fn client_address(request: &Request) -> Option<IpAddr> {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Some(addr.ip());
    }
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|hop| hop.trim().parse().ok())
}

async fn resolve(
    authenticator: &Authenticator,
    request: Request,
) -> (Request, Result<AuthContext, AuthError>) {
    match SignedHeaders::from_headers(request.headers()) {
        Some(Err(e)) => (request, Err(e)),
        Some(Ok(signed)) => {
            // Nothing is buffered for clients we would reject anyway
            if !authenticator.knows_client(&signed.client) {
                return (request, Err(AuthError::UnknownClient(signed.client)));
            }
            let (parts, body) = request.into_parts();
            let bytes = match Limited::new(body, MAX_BODY_BYTES).collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    let error = if e.is::<LengthLimitError>() {
                        AuthError::BodyTooLarge
                    } else {
                        tracing::warn!("Failed to read signed request body: {}", e);
                        AuthError::Malformed
                    };
                    return (Request::from_parts(parts, Body::empty()), Err(error));
                }
            };
            let result = authenticator
                .verify_signed(&signed, &parts.method, parts.uri.path(), &bytes)
                .await;
            (Request::from_parts(parts, Body::from(bytes)), result)
        }
        None => {
            let result = match extract_secret(&request) {
                Ok(Some(secret)) => authenticator.resolve_secret(&secret),
                Ok(None) => authenticator.anonymous(client_address(&request), request.headers()),
                Err(e) => Err(e),
            };
            (request, result)
        }
    }
}

/// Authentication middleware for protected routes
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let (mut request, result) = resolve(&state.authenticator, request).await;

    match result {
        Ok(auth) => {
            tracing::debug!(
                identity = %auth.identity,
                plan = %auth.plan,
                %method,
                path = %path,
                "Authenticated"
            );
            request.extensions_mut().insert(auth);
            Ok(next.run(request).await)
        }
        Err(e) => {
            tracing::warn!(%method, path = %path, "Authentication failed: {}", e);
            state.audit.record(AuditEvent::new(
                Timestamp::new(state.clock.now_millis()),
                AuditKind::AuthFailed,
                "unknown",
                json!({ "method": method.as_str(), "path": path, "reason": e.to_string() }),
            ));
            match e {
                AuthError::BodyTooLarge => Err(ApiError::BadRequest(e.to_string())),
                _ => Err(ApiError::Unauthorized(e.to_string())),
            }
        }
    }
}

/// Owner gate; must run inside [`authenticate`]
pub async fn require_owner(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if auth.identity.is_owner() {
        return Ok(next.run(request).await);
    }
    let path = request.uri().path().to_string();
    tracing::warn!(identity = %auth.identity, path = %path, "Owner route denied");
    state.audit.record(AuditEvent::new(
        Timestamp::new(state.clock.now_millis()),
        AuditKind::AccessDenied,
        auth.identity.key(),
        json!({ "path": path }),
    ));
    Err(ApiError::Forbidden)
}
