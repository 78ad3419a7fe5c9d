use idpstore_crypto::CryptoError;
use idpstore_eventstore::error::{EventstoreError, SerializationError};
use thiserror::Error;

use crate::domain::IdpType;

/// A command was understood but rejected by a business rule.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ValidationError {
    /// The error classification
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
}

/// Classification of validation errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ErrorCode {
    /// The identity provider does not exist, or no longer does.
    #[error("not_found")]
    NotFound,

    /// An identity provider with this id already exists.
    #[error("already_exists")]
    AlreadyExists,

    /// The identity provider is in a state that forbids the operation.
    /// Example: materializing a removed provider
    #[error("precondition_failed")]
    PreconditionFailed,

    /// The requested configuration is malformed.
    /// Example: "name must not be empty"
    #[error("invalid_argument")]
    InvalidArgument,

    /// An update event was built without any change.
    #[error("no_changes")]
    NoChanges,
}

impl ValidationError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::NotFound,
            message: message.into(),
        }
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::AlreadyExists,
            message: message.into(),
        }
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::PreconditionFailed,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidArgument,
            message: message.into(),
        }
    }

    pub fn no_changes() -> Self {
        Self {
            code: ErrorCode::NoChanges,
            message: "no changes".to_string(),
        }
    }
}

/// Error returned by IDP commands and write models.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Eventstore(#[from] EventstoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("unknown identity provider kind: {0}")]
    UnknownKind(IdpType),
}

impl From<SerializationError> for Error {
    fn from(err: SerializationError) -> Self {
        Error::Eventstore(err.into())
    }
}

impl Error {
    /// The validation code, if this is a validation error.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::Validation(err) => Some(err.code),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Eventstore(err) if err.is_conflict())
    }
}
