//! Batch scheduler errors.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by `submit` or delivered through a pending handle.
///
/// `Clone` so that one failed batch can resolve every handle in it with the
/// same error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchError {
    #[error("queue saturated: {depth} requests pending")]
    QueueSaturated { depth: usize },

    #[error("backend batch failed: {0}")]
    Backend(String),

    #[error("backend returned {got} results for a batch of {expected}")]
    ResultMismatch { expected: usize, got: usize },

    #[error("no result within {0:?}")]
    Timeout(Duration),

    #[error("scheduler is shut down")]
    Closed,

    #[error("no tokio runtime available to run the dispatch loop")]
    NoRuntime,

    #[error("invalid batch config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, BatchError>;
