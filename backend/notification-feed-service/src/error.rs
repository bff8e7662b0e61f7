use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use nova_firebase_shared::FirebaseError;
use thiserror::Error;

use crate::models::ErrorResponse;

pub type Result<T> = std::result::Result<T, AppError>;

/// Token verification failures. Always the caller's problem (401), except
/// `ProviderUnavailable` which is still answered with 401 but logged as ours.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token has expired")]
    Expired,

    #[error("token rejected: {0}")]
    Rejected(String),

    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),
}

impl From<FirebaseError> for AuthError {
    fn from(err: FirebaseError) -> Self {
        match err {
            FirebaseError::MalformedIdToken(msg) => AuthError::Malformed(msg),
            FirebaseError::ExpiredIdToken => AuthError::Expired,
            FirebaseError::RejectedIdToken(msg) => AuthError::Rejected(msg),
            other => AuthError::ProviderUnavailable(other.to_string()),
        }
    }
}

/// Snapshot source failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store query failed: {0}")]
    Query(String),

    #[error("change stream registration failed: {0}")]
    Subscribe(String),

    #[error("change stream interrupted: {0}")]
    Stream(String),
}

/// Per-subscriber delivery failure; never leaves the broadcaster
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("subscriber channel closed")]
    Closed,

    #[error("subscriber send buffer full")]
    Lagging,
}

impl TransportError {
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Closed => "closed",
            TransportError::Lagging => "lagging",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal server error")]
    Internal(String),
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Config(_)
            | AppError::Store(_)
            | AppError::Transport(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}
