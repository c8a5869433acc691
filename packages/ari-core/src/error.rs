//! Centralized error types for the Ari core library.
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

use crate::engine::EngineError;
use crate::entry::Aid;
use crate::types::GuildId;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for EngineError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "engine_http_failed",
            Self::HttpStatus(_, _) => "engine_error_status",
            Self::Decode(_) => "engine_decode_failed",
        }
    }
}

/// Broad classification of failures, as reported to procedure callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Bad arguments. Rejected synchronously, no state change.
    Validation,
    /// Operation is not valid in the current session state.
    StateConflict,
    /// The audio engine could not accept the command. Safe to retry.
    EngineUnavailable,
    /// Unexpected failure inside the orchestrator or its collaborators.
    Internal,
}

/// Application-wide error type for Ari.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AriError {
    /// The guild has no session, or its session was torn down.
    #[error("Guild {0} is not connected")]
    GuildNotConnected(GuildId),

    /// No queue entry with this aid exists.
    ///
    /// Part of the wire error taxonomy only: `dequeue` and `move` report an
    /// unknown aid by returning `false`, so no procedure raises it today.
    #[error("Entry not found: {0}")]
    EntryNotFound(Aid),

    /// The caller failed to authenticate.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A position or index lies outside the accepted bounds.
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The operation is not valid in the current session state.
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// The audio engine could not be reached or refused the command.
    #[error("Audio engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Server configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AriError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::GuildNotConnected(_) => "guild_not_connected",
            Self::EntryNotFound(_) => "entry_not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::InvalidRange(_) => "invalid_range",
            Self::InvalidRequest(_) => "invalid_request",
            Self::StateConflict(_) => "state_conflict",
            Self::EngineUnavailable(_) => "engine_unavailable",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Returns the broad failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EntryNotFound(_)
            | Self::Unauthorized(_)
            | Self::InvalidRange(_)
            | Self::InvalidRequest(_) => ErrorKind::Validation,
            Self::GuildNotConnected(_) | Self::StateConflict(_) => ErrorKind::StateConflict,
            Self::EngineUnavailable(_) => ErrorKind::EngineUnavailable,
            Self::Internal(_) | Self::Configuration(_) => ErrorKind::Internal,
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::GuildNotConnected(_) | Self::EntryNotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidRange(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::StateConflict(_) => StatusCode::CONFLICT,
            Self::EngineUnavailable(_) | Self::Configuration(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result Type Aliases
// ─────────────────────────────────────────────────────────────────────────────

// Re-export Result type aliases from their defining modules
pub use crate::engine::EngineResult;

/// Convenient Result alias for application-wide operations.
pub type AriResult<T> = Result<T, AriError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for AriError {
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

impl From<EngineError> for AriError {
    fn from(err: EngineError) -> Self {
        if err.is_unavailable() {
            Self::EngineUnavailable(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guild_not_connected_returns_correct_code() {
        let err = AriError::GuildNotConnected(GuildId(7));
        assert_eq!(err.code(), "guild_not_connected");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert_eq!(err.to_string(), "Guild 7 is not connected");
    }

    #[test]
    fn entry_not_found_is_validation_error() {
        let err = AriError::EntryNotFound(Aid(3));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unauthorized_maps_to_401() {
        let err = AriError::Unauthorized("bad token".into());
        assert_eq!(err.code(), "unauthorized");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn engine_unavailable_maps_to_service_unavailable() {
        let err = AriError::EngineUnavailable("node down".into());
        assert_eq!(err.code(), "engine_unavailable");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.kind(), ErrorKind::EngineUnavailable);
    }

    #[test]
    fn engine_server_error_becomes_unavailable() {
        let err: AriError = EngineError::HttpStatus(503, "busy".into()).into();
        assert!(matches!(err, AriError::EngineUnavailable(_)));
    }

    #[test]
    fn engine_client_error_becomes_internal() {
        let err: AriError = EngineError::HttpStatus(400, "bad body".into()).into();
        assert!(matches!(err, AriError::Internal(_)));
    }
}
