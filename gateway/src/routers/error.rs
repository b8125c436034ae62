//! HTTP-surface error responses for the pre-upgrade path.
//!
//! Once a socket is open, failures are reported as `error` wire events
//! (see [`crate::error::GatewayError`]), not HTTP responses — these helpers
//! only cover the `GET /v1/realtime` handshake itself.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    #[serde(rename = "type")]
    error_type: &'static str,
    code: &'a str,
    message: &'a str,
}

pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::BAD_REQUEST, code, message)
}

pub fn unauthorized(code: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::UNAUTHORIZED, code, message)
}

pub fn service_unavailable(code: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::SERVICE_UNAVAILABLE, code, message)
}

fn create_error(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Response {
    let code_str = code.into();
    let message_str = message.into();
    (
        status,
        Json(ErrorResponse {
            error: ErrorDetail {
                error_type: status.canonical_reason().unwrap_or("error"),
                code: &code_str,
                message: &message_str,
            },
        }),
    )
        .into_response()
}
