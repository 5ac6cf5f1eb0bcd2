//! Centralized error types for the hub.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the hub.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum HubError {
    /// No free slot was available to assign to a new connection.
    #[error("Server full (max {0} agents)")]
    SlotsExhausted(u8),

    /// Requested stream/slot does not exist or has no active session.
    #[error("Slot not found: {0}")]
    SlotNotFound(u8),

    /// Client sent a malformed or out-of-protocol request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The server failed to start (bind, config, or pipeline directories).
    #[error("Startup failed: {0}")]
    Startup(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SlotsExhausted(_) => "server_full",
            Self::SlotNotFound(_) => "slot_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Startup(_) => "startup_failed",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SlotNotFound(_) => StatusCode::NOT_FOUND,
            Self::SlotsExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Startup(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type HubResult<T> = Result<T, HubError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_not_found_returns_correct_code() {
        let err = HubError::SlotNotFound(3);
        assert_eq!(err.code(), "slot_not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn slots_exhausted_returns_service_unavailable() {
        let err = HubError::SlotsExhausted(8);
        assert_eq!(err.code(), "server_full");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn invalid_request_returns_bad_request() {
        let err = HubError::InvalidRequest("unknown type".into());
        assert_eq!(err.code(), "invalid_request");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
