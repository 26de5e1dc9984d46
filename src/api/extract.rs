//! Request extractors: the session behind a request and the origin policy
//! applied to the status stream.

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use super::error::ApiError;
use super::state::AppState;
use crate::session::{SessionUser, session_token};

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("missing session".into()))?;

        state
            .sessions
            .resolve(token)
            .await
            .ok_or_else(|| ApiError::Unauthorized("unknown or expired session".into()))
    }
}

/// Marker extractor: the request's `Origin` passed [`origin_allowed`]
#[derive(Debug, Clone)]
pub struct AllowedOrigin(pub String);

impl FromRequestParts<AppState> for AllowedOrigin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let origin = parts
            .headers
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Forbidden("missing Origin header".into()))?;

        let host = parts.headers.get(header::HOST).and_then(|v| v.to_str().ok());
        let frontend = state.config.server.frontend_origin.as_deref();

        if origin_allowed(origin, frontend, host) {
            Ok(AllowedOrigin(origin.to_string()))
        } else {
            tracing::warn!(origin, "Rejected status stream origin");
            Err(ApiError::Forbidden(format!("origin '{origin}' not allowed")))
        }
    }
}

/// Local development origins, the configured frontend, or same host
pub fn origin_allowed(origin: &str, frontend_origin: Option<&str>, host: Option<&str>) -> bool {
    let origin = origin.trim().trim_end_matches('/');

    if frontend_origin.is_some_and(|f| f.trim().trim_end_matches('/').eq_ignore_ascii_case(origin)) {
        return true;
    }

    let Some(origin_host) = origin_hostname(origin) else {
        return false;
    };

    if matches!(origin_host, "localhost" | "127.0.0.1" | "[::1]") {
        return true;
    }

    host.map(authority_hostname)
        .is_some_and(|h| !h.is_empty() && h.eq_ignore_ascii_case(origin_host))
}

/// Hostname of a serialized origin such as `https://app.example:8443`
fn origin_hostname(origin: &str) -> Option<&str> {
    let (_, rest) = origin.split_once("://")?;
    let authority = rest.split('/').next().unwrap_or(rest);
    let hostname = authority_hostname(authority);
    (!hostname.is_empty()).then_some(hostname)
}

/// Strip the port from `host[:port]`; IPv6 literals keep their brackets
fn authority_hostname(authority: &str) -> &str {
    let authority = authority.trim();
    if authority.starts_with('[') {
        return match authority.find(']') {
            Some(end) => &authority[..=end],
            None => authority,
        };
    }
    authority.split(':').next().unwrap_or(authority)
}
