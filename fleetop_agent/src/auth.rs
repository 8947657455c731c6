//! HTTP Basic authentication against the stored salted hash.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::debug;

use fleetop::password::verify;

use crate::state::AppState;

/// `(username, password)` from an `Authorization: Basic ...` header.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

pub async fn require_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(stored) = state.password.as_deref() else {
        return next.run(req).await;
    };
    match basic_credentials(req.headers()) {
        Some((user, pass)) if user == *state.username && verify(stored, &pass) => {
            next.run(req).await
        }
        other => {
            debug!(
                "rejected {} {} (credentials {})",
                req.method(),
                req.uri().path(),
                if other.is_some() { "wrong" } else { "missing" }
            );
            let mut resp = StatusCode::UNAUTHORIZED.into_response();
            resp.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"fleetop\""),
            );
            resp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_header() {
        let mut h = HeaderMap::new();
        let token = STANDARD.encode("glances:abc:def");
        h.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {token}")).unwrap(),
        );
        assert_eq!(
            basic_credentials(&h),
            Some(("glances".to_string(), "abc:def".to_string()))
        );
        h.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer x"));
        assert_eq!(basic_credentials(&h), None);
    }
}
