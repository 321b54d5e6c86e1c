//! Error types for API client operations

use crate::classify::ErrorResponse;

/// Errors surfaced to API callers.
///
/// `Clone` so a single refresh outcome can be handed to every caller waiting
/// on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("transport failure: {0}")]
    Transport(#[from] transport::Error),

    /// The server rejected the session. The logout handler has already run.
    #[error("authentication rejected, session logged out")]
    LoggedOut,

    #[error("API error {}: {}", .0.status, .0.display_message())]
    Api(Box<ErrorResponse>),

    #[error("no refresh token available")]
    RefreshUnavailable,

    #[error("access token unusable: {0}")]
    TokenDecode(String),

    #[error("token store error: {0}")]
    Store(String),

    #[error("response decode failed: {0}")]
    Decode(String),

    #[error("request encode failed: {0}")]
    Encode(String),
}

impl From<vault_auth::Error> for Error {
    fn from(err: vault_auth::Error) -> Self {
        match err {
            vault_auth::Error::TokenDecode(msg) => Error::TokenDecode(msg),
            other => Error::Store(other.to_string()),
        }
    }
}

impl Error {
    /// Status code when the error came from an API response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api(response) => Some(response.status),
            _ => None,
        }
    }
}

/// Result alias for API client operations.
pub type Result<T> = std::result::Result<T, Error>;
