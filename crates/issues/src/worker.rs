//! Shared error type for worker adapters (`scm`, `verify`). Adapters that
//! shell out to external tools communicate failure as data, never by
//! panicking or unwinding across the trait boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("vcs operation failed: {0}")]
    Vcs(String),
    #[error("verification failed: {0}")]
    Verify(String),
    #[error("deploy operation failed: {0}")]
    Deploy(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type WorkerResult<T> = Result<T, WorkerError>;
