use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use crate::rbac::RbacError;

/// Errors for the middleware layer.
///
/// Session and CSRF rejections never say which check failed.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No valid session found, or the session failed a check.
    #[error("Not authenticated")]
    Unauthenticated,

    /// CSRF token missing, mismatched, expired or tied to another session.
    #[error("CSRF token is invalid or expired")]
    Csrf,

    /// The subject lacks the route's roles or permissions.
    #[error("Insufficient permissions")]
    Forbidden { details: Option<Value> },

    /// Request input could not be bound.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Returned by a route handler with the status it chose.
    #[error("{message}")]
    Handler { status: StatusCode, message: String },

    #[error("RBAC error: {0}")]
    Rbac(#[from] RbacError),

    /// Token sealing or key store failure.
    #[error("Token error: {0}")]
    Token(#[from] crate::error::Error),

    /// Session store operation failed.
    #[error("Session store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// A handler error rendered with `status`.
    #[must_use]
    pub fn handler(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Handler {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated | Self::Csrf => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Handler { status, .. } => *status,
            Self::Rbac(_) | Self::Token(_) | Self::Store(_) | Self::Internal(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Forbidden {
                details: Some(ref details),
            } => json!({ "error": self.to_string(), "details": details }),
            Self::Rbac(_) | Self::Token(_) | Self::Store(_) | Self::Internal(_) | Self::Config(_) => {
                tracing::error!(error = %self, "Auth internal error");
                json!({ "error": "Internal error" })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AuthError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::Csrf.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::Forbidden { details: None }.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AuthError::Validation("bad".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AuthError::handler(StatusCode::CONFLICT, "taken").status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AuthError::Store("down".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
