//! HTTP Basic authentication for every route except /health.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;

use super::server::GatewayState;

const REALM_CHALLENGE: &str = "Basic realm=\"worksgate\"";

/// Expected username/password pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// True when the Authorization header carries exactly these credentials.
    pub fn matches(&self, headers: &HeaderMap) -> bool {
        parse_basic_header(headers)
            .map(|(user, pass)| user == self.username && pass == self.password)
            .unwrap_or(false)
    }
}

/// Decode `Authorization: Basic base64(user:pass)`.
fn parse_basic_header(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, HeaderValue::from_static(REALM_CHALLENGE))],
        "Unauthorized",
    )
        .into_response()
}

/// Middleware: challenge requests without valid credentials. No-op when auth is not configured.
pub async fn require_basic_auth(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(ref expected) = state.basic_auth {
        if !expected.matches(request.headers()) {
            log::debug!("basic auth rejected for {}", request.uri().path());
            return unauthorized();
        }
    }
    next.run(request).await
}
