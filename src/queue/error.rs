use thiserror::Error;

use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job queue is not accepting work")]
    Closed,

    #[error("Job worker already started")]
    AlreadyStarted,

    #[error("Unrecoverable job: {0}")]
    UnrecoverableJob(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

pub type Result<T> = std::result::Result<T, QueueError>;
