use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use vpsboard_common::Error;

/// Maps a domain error to its HTTP response. Internal failures are logged
/// with their detail and surfaced with a generic message.
pub fn error_response(err: Error) -> Response {
    let status = match &err {
        Error::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        Error::Forbidden(_) => StatusCode::FORBIDDEN,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidRange(_) => StatusCode::BAD_REQUEST,
        Error::DuplicateAddress(_)
        | Error::DuplicateIdentity(_)
        | Error::InvalidStateTransition(_)
        | Error::NotConfigured(_) => StatusCode::CONFLICT,
        Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = match &err {
        Error::Internal(detail) => {
            tracing::error!("internal error: {}", detail);
            "Internal server error".to_string()
        }
        other => other.to_string(),
    };
    (status, Json(json!({ "error": err.kind(), "message": message }))).into_response()
}
