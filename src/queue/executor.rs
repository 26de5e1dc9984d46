use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::job::Job;

/// Errors from running a job against the external task manager
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to prepare workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("job exceeded its {0:?} deadline")]
    TimedOut(Duration),

    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error("executor not configured: {0}")]
    NotConfigured(&'static str),

    #[error("unreadable task export: {0}")]
    Export(#[source] serde_json::Error),
}

/// Performs the external side effect of a job.
///
/// The queue guarantees calls never overlap, so implementations may assume
/// exclusive access to any shared external state.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &Job) -> Result<(), ExecError>;
}
