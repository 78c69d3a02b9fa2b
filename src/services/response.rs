//! HTTP response building helpers
//!
//! One place that maps `LedgerError` to status codes, so every handler
//! formats errors the same way.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::LedgerError;

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
    response
}

pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

pub fn created<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::CREATED, body)
}

pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "error": message, "kind": "not_found" }),
    )
}

/// Status code for an error kind
pub fn status_for(error: &LedgerError) -> StatusCode {
    match error {
        LedgerError::Validation(_) | LedgerError::Json(_) => StatusCode::BAD_REQUEST,
        LedgerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        LedgerError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
        LedgerError::Forbidden(_) => StatusCode::FORBIDDEN,
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::Conflict(_) => StatusCode::CONFLICT,
        LedgerError::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ if error.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a LedgerError to an HTTP response
pub fn error_response(error: LedgerError) -> Response<Full<Bytes>> {
    let status = status_for(&error);
    if status.is_server_error() {
        error!(kind = error.kind(), "Request failed: {}", error);
    }

    let mut body = serde_json::json!({ "error": error.to_string(), "kind": error.kind() });
    if let LedgerError::InsufficientCredits { available, required } = &error {
        body["available"] = serde_json::json!(available);
        body["required"] = serde_json::json!(required);
    }
    json_response(status, &body)
}

/// Wrap a service result into a 200 response
pub fn from_result<T: Serialize>(result: Result<T, LedgerError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => ok(&value),
        Err(e) => error_response(e),
    }
}

/// Wrap a create result into a 201 response
pub fn from_create_result<T: Serialize>(result: Result<T, LedgerError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => created(&value),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_response() {
        let resp = ok(&serde_json::json!({"test": true}));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_error_statuses() {
        let cases = [
            (LedgerError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (LedgerError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (LedgerError::InsufficientCredits { available: 1, required: 2 }, StatusCode::PAYMENT_REQUIRED),
            (LedgerError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (LedgerError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (LedgerError::Conflict("x".into()), StatusCode::CONFLICT),
            (LedgerError::Dependency("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (LedgerError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error_response(error).status(), status);
        }
    }

    #[test]
    fn test_locked_store_is_503() {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};

        let locked = LedgerError::from(DieselError::DatabaseError(
            DatabaseErrorKind::Unknown,
            Box::new("database is locked".to_string()),
        ));
        assert_eq!(status_for(&locked), StatusCode::SERVICE_UNAVAILABLE);
    }
}
