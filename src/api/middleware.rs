use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::{error::ApiError, state::AppState};
use crate::ratelimit::resolve_client_ip;

/// Admission control in front of every rate limited route.
///
/// Denied requests are answered here and never reach a handler.
pub async fn rate_limit(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = resolve_client_ip(peer.ip(), request.headers(), &state.trusted_proxies);
    let decision = state.limiter.is_allowed(&key);

    if !decision.allowed {
        warn!(
            key = %key,
            path = %request.uri().path(),
            retry_after_secs = decision.retry_after_secs(),
            "Rate limit exceeded"
        );
        return Err(ApiError::RateLimited(decision));
    }

    Ok(next.run(request).await)
}
