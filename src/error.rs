//! # Error Handling
//!
//! Every way a ceremony can be rejected has its own variant, and every variant
//! knows how to turn itself into an HTTP response.
//!
//! Rejections are the client's problem: they are answered with `400` and a
//! `{ "success": false, "error": ..., "code": ... }` body. Faults on our side
//! (database, serialization) are answered with `500` and a generic message;
//! the detail only goes to the log.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or malformed request fields
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The challenge is unknown, expired, or was already consumed
    #[error("No pending ceremony for this challenge")]
    CeremonyNotFound,

    /// A registration challenge was presented to the authentication
    /// endpoint, or the other way around
    #[error("Challenge was issued for a {issued_for} ceremony")]
    CeremonyKindMismatch { issued_for: &'static str },

    /// clientDataJSON does not carry the issued challenge or ceremony type
    #[error("Challenge mismatch: {0}")]
    ChallengeMismatch(String),

    /// clientDataJSON origin or authenticator RP ID hash is not ours
    #[error("Origin mismatch: {0}")]
    OriginMismatch(String),

    /// The credential payload is missing pieces or cannot be decoded
    #[error("Malformed credential: {0}")]
    MalformedCredential(String),

    /// A credential with this ID is already registered
    #[error("Credential is already registered")]
    DuplicateCredential,

    /// No credential with this ID is registered
    #[error("Unknown credential")]
    UnknownCredential,

    /// The credential is not in the ceremony's allow list or belongs to
    /// another user
    #[error("Credential is not allowed for this ceremony")]
    CredentialNotAllowed,

    /// The assertion signature does not verify against the stored key
    #[error("Signature verification failed")]
    SignatureVerification,

    /// The authenticator's signature counter did not increase
    #[error("Signature counter did not increase; the credential may be cloned")]
    ReplayOrCloneSuspected,

    /// Database errors (SQLx library errors)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization of stored state failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Anything else that is our fault
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable, machine-readable name of the error class.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "InvalidInputError",
            AppError::CeremonyNotFound => "CeremonyNotFoundError",
            AppError::CeremonyKindMismatch { .. } => "CeremonyKindMismatchError",
            AppError::ChallengeMismatch(_) => "ChallengeMismatchError",
            AppError::OriginMismatch(_) => "OriginMismatchError",
            AppError::MalformedCredential(_) => "MalformedCredentialError",
            AppError::DuplicateCredential => "DuplicateCredentialError",
            AppError::UnknownCredential => "UnknownCredentialError",
            AppError::CredentialNotAllowed => "CredentialNotAllowedError",
            AppError::SignatureVerification => "SignatureVerificationError",
            AppError::ReplayOrCloneSuspected => "ReplayOrCloneSuspectedError",
            AppError::Database(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                "InternalError"
            }
        }
    }

    /// True when the ceremony was rejected, as opposed to the server failing.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            AppError::Database(_) | AppError::Serialization(_) | AppError::Internal(_)
        )
    }

    pub fn status(&self) -> StatusCode {
        if self.is_rejection() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

/// Convert AppError into an HTTP response
///
/// Integrity violations are logged at `warn` because they can be an attack in
/// progress; internal faults at `error` with the full detail, which is never
/// sent to the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::ChallengeMismatch(reason) | AppError::OriginMismatch(reason) => {
                tracing::warn!(code = self.code(), %reason, "ceremony integrity violation");
                self.to_string()
            }
            AppError::ReplayOrCloneSuspected => {
                tracing::warn!(code = self.code(), "possible cloned authenticator");
                self.to_string()
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Internal server error".to_string()
            }
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {:?}", e);
                "Internal server error".to_string()
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                "Internal server error".to_string()
            }
            _ => {
                tracing::debug!(code = self.code(), "ceremony rejected: {}", self);
                self.to_string()
            }
        };

        let body = Json(json!({
            "success": false,
            "error": message,
            "code": self.code(),
        }));

        (self.status(), body).into_response()
    }
}

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;
