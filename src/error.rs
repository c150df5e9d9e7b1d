use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Why a request failed to authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingToken,
    Invalid,
    Expired,
    SignatureMismatch,
    StateMismatch,
    ExchangeFailed,
    ProfileFetchFailed,
}

impl AuthFailure {
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::Invalid => "invalid",
            Self::Expired => "expired",
            Self::SignatureMismatch => "signature_mismatch",
            Self::StateMismatch => "state_mismatch",
            Self::ExchangeFailed => "exchange_failed",
            Self::ProfileFetchFailed => "profile_fetch_failed",
        }
    }

    /// Wire code used in error bodies.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MissingToken => "MISSING_TOKEN",
            Self::Invalid => "INVALID_TOKEN",
            Self::Expired => "TOKEN_EXPIRED",
            Self::SignatureMismatch => "SIGNATURE_MISMATCH",
            Self::StateMismatch => "STATE_MISMATCH",
            Self::ExchangeFailed => "TOKEN_EXCHANGE_FAILED",
            Self::ProfileFetchFailed => "PROFILE_FETCH_FAILED",
        }
    }

    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::MissingToken => "Authentication required",
            Self::Invalid => "Invalid session token",
            Self::Expired => "Session token expired",
            Self::SignatureMismatch => "Session token signature mismatch",
            Self::StateMismatch => "Invalid or expired login state",
            Self::ExchangeFailed => "Failed to exchange authorization code",
            Self::ProfileFetchFailed => "Failed to fetch provider profile",
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed ({} field errors)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("authentication failed: {0}")]
    Authentication(AuthFailure),

    #[error("forbidden")]
    Forbidden,

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    /// Maps a unique-constraint violation to `Conflict`, leaving other errors untouched.
    pub(crate) fn from_sqlite(err: rusqlite::Error, conflict: &str) -> Self {
        if let rusqlite::Error::SqliteFailure(ref code, _) = err {
            if code.code == rusqlite::ErrorCode::ConstraintViolation
                && matches!(
                    code.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
            {
                return Self::Conflict(conflict.to_string());
            }
        }
        Self::Database(err)
    }
}

impl From<AuthFailure> for Error {
    fn from(failure: AuthFailure) -> Self {
        Self::Authentication(failure)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
