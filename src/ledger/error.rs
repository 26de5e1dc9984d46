use thiserror::Error;

use super::partitions::JobState;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job {id} not found in partition '{partition}'")]
    NotInPartition { id: String, partition: &'static str },

    #[error("Invalid state transition to {0}")]
    InvalidTransition(JobState),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
