use thiserror::Error;

/// Firebase Client Error Types
#[derive(Error, Debug)]
pub enum FirebaseError {
    #[error("Invalid service account credentials: {0}")]
    InvalidCredentials(String),

    #[error("Failed to write credentials file: {0}")]
    CredentialsIo(#[from] std::io::Error),

    #[error("Failed to parse private key: {0}")]
    KeyParseError(String),

    #[error("Failed to encode JWT: {0}")]
    JwtEncodeError(String),

    #[error("Failed to get access token: {0}")]
    TokenError(String),

    #[error("Token request failed with status: {0}")]
    TokenRequestFailed(String),

    #[error("Firestore request failed: {0}")]
    FirestoreRequest(String),

    #[error("Firestore API error: {0} - {1}")]
    ApiError(String, String),

    #[error("Failed to parse Firestore response: {0}")]
    ResponseParseError(String),

    #[error("Malformed ID token: {0}")]
    MalformedIdToken(String),

    #[error("ID token has expired")]
    ExpiredIdToken,

    #[error("ID token rejected: {0}")]
    RejectedIdToken(String),

    #[error("Failed to fetch token signing keys: {0}")]
    KeyFetchError(String),
}

impl FirebaseError {
    /// True when the failure is about the presented ID token rather than
    /// about reaching Google.
    pub fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            Self::MalformedIdToken(_) | Self::ExpiredIdToken | Self::RejectedIdToken(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FirebaseError>;
