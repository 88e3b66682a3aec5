//! Per-identity request rate limit (`governor`, keyed by identity key).

use std::{num::NonZeroU32, sync::Arc};

use axum::{
    Extension,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::{
    domain::AuthContext,
    ui::{error::ApiError, state::AppState},
};

pub struct IdentityRateLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
}

impl IdentityRateLimiter {
    /// `None` when `requests_per_minute` is 0
    pub fn per_minute(requests_per_minute: u32) -> Option<Self> {
        NonZeroU32::new(requests_per_minute).map(|n| Self {
            limiter: RateLimiter::keyed(Quota::per_minute(n)),
        })
    }

    pub fn check(&self, identity_key: &str) -> bool {
        self.limiter.check_key(&identity_key.to_string()).is_ok()
    }

    /// Drop state of identities that are back at full quota
    pub fn sweep(&self) {
        self.limiter.retain_recent();
    }
}

/// Must run inside the authentication middleware
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(limiter) = &state.rate_limiter
        && !limiter.check(&auth.identity.key())
    {
        tracing::info!(identity = %auth.identity, "Rate limited");
        return Err(ApiError::RateLimited);
    }
    Ok(next.run(request).await)
}
