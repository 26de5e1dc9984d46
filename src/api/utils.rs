//! Request body helpers shared by the mutation handlers

use axum::body::Body;
use axum::http::{HeaderMap, header};
use serde::de::DeserializeOwned;

use crate::api::error::ApiError;

/// Largest accepted request body
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Parses and validates Content-Type header for application/json
///
/// Accepts `application/json`, optionally with a charset parameter.
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type.parse().map_err(|_| {
        ApiError::InvalidPayload(format!("invalid Content-Type: {}", content_type))
    })?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}

pub fn validate_body_size(data: &[u8], max_size: usize) -> Result<(), ApiError> {
    if data.len() > max_size {
        return Err(ApiError::PayloadTooLarge(data.len()));
    }
    Ok(())
}

/// Read a bounded JSON body and decode it
pub async fn read_json<T: DeserializeOwned>(headers: &HeaderMap, body: Body) -> Result<T, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    parse_content_type(content_type)?;

    // Read past the limit so oversized bodies get a precise 413
    let bytes = axum::body::to_bytes(body, MAX_PAYLOAD_SIZE * 2)
        .await
        .map_err(|e| ApiError::InvalidPayload(format!("failed to read body: {e}")))?;
    validate_body_size(&bytes, MAX_PAYLOAD_SIZE)?;

    Ok(serde_json::from_slice(&bytes)?)
}
