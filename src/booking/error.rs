use thiserror::Error;

use crate::model::ResourceId;
use crate::resolver::UnsupportedType;
use crate::resources::RemoteError;
use crate::store::StoreError;

/// Machine-readable failure class, one per [`BookingError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    UnsupportedType,
    ResourceUnavailable,
    RemoteUnavailable,
    StoreFailure,
    NotFound,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::UnsupportedType => "unsupported_type",
            ErrorKind::ResourceUnavailable => "resource_unavailable",
            ErrorKind::RemoteUnavailable => "remote_unavailable",
            ErrorKind::StoreFailure => "store_failure",
            ErrorKind::NotFound => "not_found",
        }
    }
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    UnsupportedType(#[from] UnsupportedType),
    #[error("resource {0} is not available")]
    ResourceUnavailable(ResourceId),
    #[error(transparent)]
    RemoteUnavailable(RemoteError),
    #[error("booking store: {0}")]
    StoreFailure(#[from] StoreError),
    #[error("not found: {0}")]
    NotFound(String),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::Validation(_) => ErrorKind::Validation,
            BookingError::UnsupportedType(_) => ErrorKind::UnsupportedType,
            BookingError::ResourceUnavailable(_) => ErrorKind::ResourceUnavailable,
            BookingError::RemoteUnavailable(_) => ErrorKind::RemoteUnavailable,
            BookingError::StoreFailure(_) => ErrorKind::StoreFailure,
            BookingError::NotFound(_) => ErrorKind::NotFound,
        }
    }
}

/// A resource the remote service does not know is a missing entity, not an
/// outage.
impl From<RemoteError> for BookingError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::NotFound(what) => BookingError::NotFound(what),
            other => BookingError::RemoteUnavailable(other),
        }
    }
}
