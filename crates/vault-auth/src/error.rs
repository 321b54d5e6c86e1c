//! Error types for token handling and storage

/// Errors from token decoding and persistence.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("token decode failed: {0}")]
    TokenDecode(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
