//! Gateway middleware.
//!
//! Layer order, outermost first: CORS, tracing, panic boundary, then on
//! protected routes authentication, rate limiting and the owner gate.

mod auth;
mod cors;
mod rate_limit;

pub use auth::{
    AuthError, Authenticator, CLIENT_HEADER, SignedHeaders, KEY_HEADER, NONCE_HEADER, SIGNATURE_HEADER,
    TIMESTAMP_HEADER, authenticate, require_owner, sign_request,
};
pub use cors::{CorsPolicy, cors};
pub use rate_limit::{IdentityRateLimiter, rate_limit};
