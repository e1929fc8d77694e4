//! API utility functions
//!
//! Stateless helpers for request validation, kept apart from the handlers so
//! they can be unit tested.

use axum::http::{HeaderMap, header};
use http_body_util::LengthLimitError;

use crate::api::error::ApiError;

/// Parses and validates Content-Type header for application/json
///
/// Accepts `application/json` with or without a charset parameter; rejects
/// look-alikes such as `application/jsonp` or `text/json`.
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

/// Require a JSON Content-Type header on the request.
pub fn require_json(headers: &HeaderMap) -> Result<(), ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    parse_content_type(content_type).map(|_| ())
}

/// Map a body read failure, telling an exceeded length limit apart from
/// transport errors.
pub fn body_read_error(err: axum::BoxError, limit: usize) -> ApiError {
    if err.downcast_ref::<LengthLimitError>().is_some() {
        ApiError::PayloadTooLarge { limit }
    } else {
        ApiError::InvalidPayload(format!("failed to read body: {}", err))
    }
}
