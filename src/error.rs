//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::users::repo_types::AuthProvider;

/// Application error type that converts to HTTP responses.
///
/// Every failure is terminal for the current operation; nothing here is
/// retried internally.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("Invalid provider token")]
    InvalidProviderToken,

    #[error("Email not supplied by OAuth provider")]
    EmailMissingFromProvider,

    #[error("Account is registered with {0}; use that provider to log in")]
    ProviderMismatch(AuthProvider),

    #[error("Login with {0} is not supported")]
    UnsupportedProvider(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Current password is incorrect")]
    PasswordMismatch,

    #[error("Password change is not available for OAuth accounts")]
    OAuthNotPermittedForPasswordChange,

    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::EmailAlreadyRegistered => {
                (StatusCode::CONFLICT, "email_already_registered", None)
            }
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "invalid_credentials", None)
            }
            AppError::UserNotFound(_) => {
                (StatusCode::NOT_FOUND, "user_not_found", Some(self.to_string()))
            }
            AppError::InvalidProviderToken => {
                (StatusCode::UNAUTHORIZED, "invalid_provider_token", None)
            }
            AppError::EmailMissingFromProvider => (
                StatusCode::BAD_REQUEST,
                "email_missing_from_provider",
                Some(self.to_string()),
            ),
            AppError::ProviderMismatch(_) => (
                StatusCode::BAD_REQUEST,
                "provider_mismatch",
                Some(self.to_string()),
            ),
            AppError::UnsupportedProvider(_) => (
                StatusCode::BAD_REQUEST,
                "unsupported_provider",
                Some(self.to_string()),
            ),
            AppError::TokenExpired => (StatusCode::UNAUTHORIZED, "token_expired", None),
            AppError::TokenInvalid => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::PasswordMismatch => {
                (StatusCode::BAD_REQUEST, "password_mismatch", Some(self.to_string()))
            }
            AppError::OAuthNotPermittedForPasswordChange => (
                StatusCode::BAD_REQUEST,
                "oauth_password_change",
                Some(self.to_string()),
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", None),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for services and handlers
pub type Result<T> = std::result::Result<T, AppError>;
