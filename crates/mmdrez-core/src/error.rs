use std::path::PathBuf;

use thiserror::Error;

pub type MmdrezResult<T> = Result<T, MmdrezError>;

#[derive(Debug, Error)]
pub enum MmdrezError {
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// AEAD tag verification failed. Deliberately carries no detail: a wrong
    /// password and a corrupted file look the same to the caller.
    #[error("authentication failed: wrong password/key or corrupted data")]
    AuthenticationFailure,

    #[error("key mismatch: content key could not be unwrapped with this private key")]
    KeyMismatch,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fieldless discriminant of [`MmdrezError`], for callers that branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    InvalidFormat,
    AuthenticationFailure,
    KeyMismatch,
    Io,
}

impl MmdrezError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MmdrezError::NotFound(_) => ErrorKind::NotFound,
            MmdrezError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            MmdrezError::InvalidFormat(_) => ErrorKind::InvalidFormat,
            MmdrezError::AuthenticationFailure => ErrorKind::AuthenticationFailure,
            MmdrezError::KeyMismatch => ErrorKind::KeyMismatch,
            MmdrezError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        MmdrezError::InvalidArgument(msg.into())
    }

    pub fn invalid_format(msg: impl Into<String>) -> Self {
        MmdrezError::InvalidFormat(msg.into())
    }
}
