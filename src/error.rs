// src/error.rs
use bson::Bson;
use mongodb::error::{ErrorKind, TRANSIENT_TRANSACTION_ERROR};
use thiserror::Error;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot reach MongoDB: {0}")]
    Connectivity(#[source] mongodb::error::Error),

    /// Raised by a transaction body. The transaction is rolled back and never retried.
    #[error("{0}")]
    Transaction(String),

    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(f64),

    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("invalid projection: {0}")]
    InvalidProjection(String),

    #[error("store returned a non-ObjectId identifier: {0}")]
    UnexpectedId(Bson),

    #[error("failed to encode document: {0}")]
    Encode(#[from] bson::ser::Error),

    #[error("failed to decode document: {0}")]
    Decode(#[from] bson::de::Error),

    #[error("MongoDB error: {0}")]
    Store(#[source] mongodb::error::Error),
}

/// Payload carried through the driver when a transaction body fails with a
/// non-driver error. It has no error labels, so the driver never retries it.
#[derive(Debug, Clone)]
pub(crate) struct TransactionAbort(pub(crate) String);

impl StoreError {
    /// True when the driver labelled the error `TransientTransactionError`.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Store(err) | StoreError::Connectivity(err) => {
                err.contains_label(TRANSIENT_TRANSACTION_ERROR)
            }
            _ => false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Config(_) | StoreError::Connectivity(_))
    }

    /// Hands the error back to the driver's transaction helper. Driver errors
    /// keep their labels; everything else becomes a non-retryable abort.
    pub(crate) fn into_driver(self) -> mongodb::error::Error {
        match self {
            StoreError::Store(err) | StoreError::Connectivity(err) => err,
            StoreError::Transaction(message) => {
                mongodb::error::Error::custom(TransactionAbort(message))
            }
            other => mongodb::error::Error::custom(TransactionAbort(other.to_string())),
        }
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        if let Some(TransactionAbort(message)) = err.get_custom::<TransactionAbort>() {
            return StoreError::Transaction(message.clone());
        }
        if is_connectivity(&err) {
            StoreError::Connectivity(err)
        } else {
            StoreError::Store(err)
        }
    }
}

fn is_connectivity(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::ServerSelection { .. }
            | ErrorKind::Io(_)
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::Authentication { .. }
            | ErrorKind::ConnectionPoolCleared { .. }
    )
}
