//! Error kinds shared by the gateway, the query facade and the cache.
//!
//! "Not found" is deliberately absent: single-row reads return `Option` and an empty result is never an error.

use sea_orm::DbErr;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A query descriptor, an order clause or a connection URI could not be interpreted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Any error reported by the store.
    #[error("store error: {0}")]
    Store(#[from] DbErr),

    /// One of the statements of a transactional batch failed; the transaction has been rolled back.
    #[error("transaction aborted: {0}")]
    TransactionAborted(#[source] Box<Error>),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn invalid_input<S: ToString>(msg: S) -> Self {
        Self::InvalidInput(msg.to_string())
    }

    /// Wrap an error of an inner transactional step. Already wrapped errors are passed through as is.
    pub(crate) fn aborted(err: Error) -> Self {
        match err {
            Self::TransactionAborted(_) => err,
            _ => Self::TransactionAborted(Box::new(err)),
        }
    }

    /// `true` when the error originates from the store rather than from the caller's input or scope.
    pub fn is_store(&self) -> bool {
        match self {
            Self::Store(_) => true,
            Self::TransactionAborted(inner) => inner.is_store(),
            _ => false,
        }
    }

    /// `true` for errors caused by the operation's [`Context`](crate::context::Context).
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

impl From<garde::Report> for Error {
    fn from(report: garde::Report) -> Self {
        Self::Config(report.to_string())
    }
}
