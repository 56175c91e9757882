use crate::{
    aggregate::AggregateError, model::ObligationError, money::CurrencyError,
    reconcile::SettlementError, store::StoreError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures that reject a request before anything is changed
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error(transparent)]
    Obligation(#[from] ObligationError),
    #[error(transparent)]
    Currency(#[from] CurrencyError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error("a {0} is required for this scope")]
    MissingScope(&'static str),
    #[error("rejected by the store: {0}")]
    Rejected(String),
}

/// The error taxonomy every layer normalises into
#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("transient failure, outcome unknown: {0}")]
    Transient(String),
    #[error("{} section(s) failed: {}", .0.len(), .0.join(", "))]
    Partial(Vec<&'static str>),
}

/// The category of an `Error`, without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Transient,
    Partial,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Transient(_) => ErrorKind::Transient,
            Error::Partial(_) => ErrorKind::Partial,
        }
    }
}

impl From<SettlementError> for Error {
    fn from(e: SettlementError) -> Self {
        Error::Validation(e.into())
    }
}

impl From<ObligationError> for Error {
    fn from(e: ObligationError) -> Self {
        Error::Validation(e.into())
    }
}

impl From<CurrencyError> for Error {
    fn from(e: CurrencyError) -> Self {
        Error::Validation(e.into())
    }
}

impl From<AggregateError> for Error {
    fn from(e: AggregateError) -> Self {
        Error::Validation(e.into())
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ObligationNotFound(id) => Error::NotFound(format!("obligation {}", id)),
            StoreError::InstanceNotFound(id) => Error::NotFound(format!("instance {}", id)),
            StoreError::AttachmentNotFound(r) => Error::NotFound(format!("attachment {}", r)),
            StoreError::Rejected(reason) => Error::Validation(ValidationError::Rejected(reason)),
            StoreError::Unavailable(reason) => Error::Transient(reason),
        }
    }
}
