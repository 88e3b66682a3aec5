//! Cross-origin headers.
//!
//! Every response carries the CORS headers for an allowed origin, and a
//! preflight `OPTIONS` is answered here with 204 before authentication runs.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

const ALLOW_METHODS: &str = "GET,POST,PUT,DELETE,OPTIONS";
const ALLOW_HEADERS: &str = "content-type, authorization, idempotency-key, x-consia-key, \
x-consia-client, x-consia-timestamp, x-consia-nonce, x-consia-signature";
const MAX_AGE_SECS: &str = "86400";

/// Origin allow-list
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    any: bool,
    origins: Vec<String>,
}

impl CorsPolicy {
    /// `*` anywhere in the list allows every origin
    pub fn new(origins: &[String]) -> Self {
        Self {
            any: origins.iter().any(|origin| origin == "*"),
            origins: origins
                .iter()
                .map(|origin| origin.trim_end_matches('/').to_string())
                .collect(),
        }
    }

    /// Value of `access-control-allow-origin` for a request, if any
    fn allow_origin(&self, request_headers: &HeaderMap) -> Option<HeaderValue> {
        if self.any {
            return Some(HeaderValue::from_static("*"));
        }
        let origin = request_headers.get(header::ORIGIN)?;
        let value = origin.to_str().ok()?;
        self.origins
            .iter()
            .any(|allowed| allowed == value)
            .then(|| origin.clone())
    }

    fn apply(&self, allow_origin: Option<HeaderValue>, headers: &mut HeaderMap) {
        let Some(allow_origin) = allow_origin else {
            return;
        };
        if !self.any {
            headers.append(header::VARY, HeaderValue::from_static("origin"));
        }
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
        headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static(MAX_AGE_SECS),
        );
    }
}

pub async fn cors(State(policy): State<CorsPolicy>, request: Request, next: Next) -> Response {
    let allow_origin = policy.allow_origin(request.headers());
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };
    policy.apply(allow_origin, response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_origin(origin: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, origin.parse().unwrap());
        headers
    }

    #[test]
    fn test_wildcard_allows_everything() {
        // テスト項目: `*` はどのオリジンにも `*` を返す
        let policy = CorsPolicy::new(&["*".to_string()]);
        assert_eq!(
            policy.allow_origin(&HeaderMap::new()),
            Some(HeaderValue::from_static("*"))
        );
    }

    #[test]
    fn test_allow_list_echoes_matching_origin() {
        // テスト項目: 許可リストに一致したオリジンだけがそのまま返される
        let policy = CorsPolicy::new(&["https://app.consia.example/".to_string()]);
        assert_eq!(
            policy.allow_origin(&headers_with_origin("https://app.consia.example")),
            Some(HeaderValue::from_static("https://app.consia.example"))
        );
        assert_eq!(
            policy.allow_origin(&headers_with_origin("https://evil.example")),
            None
        );
    }
}
