//! Job definitions
//!
//! A [`Job`] is one accepted mutation request: who it runs as
//! ([`Credentials`]) and what it does ([`TaskOperation`]). Both halves are
//! serializable, so the ledger can keep enough of the job to run it again
//! after a restart.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::QueueError;
use crate::ledger::JobRecord;

/// Sync credentials of the user a job runs on behalf of
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub client_id: String,
    pub encryption_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("client_id", &self.client_id)
            .field("encryption_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub entry: Option<String>,
    pub description: String,
}

/// Fields of a task to create
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub description: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub due: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub recur: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub depends: Vec<String>,
}

/// Full edit of an existing task
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskEdit {
    #[serde(rename = "taskid")]
    pub task_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub wait: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub due: Option<String>,
    #[serde(default)]
    pub recur: Option<String>,
}

/// Quick modification of an existing task
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskModification {
    #[serde(rename = "taskid")]
    pub task_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub due: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    #[serde(rename = "taskuuid")]
    pub task_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRefs {
    #[serde(rename = "taskuuids")]
    pub task_uuids: Vec<String>,
}

/// What a job does to the user's task list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOperation {
    AddTask(NewTask),
    EditTask(TaskEdit),
    ModifyTask(TaskModification),
    CompleteTask(TaskRef),
    CompleteTasks(TaskRefs),
    DeleteTask(TaskRef),
    DeleteTasks(TaskRefs),
}

impl TaskOperation {
    /// Human-readable job name used in events and logs
    pub fn name(&self) -> &'static str {
        match self {
            TaskOperation::AddTask(_) => "Add Task",
            TaskOperation::EditTask(_) => "Edit Task",
            TaskOperation::ModifyTask(_) => "Modify Task",
            TaskOperation::CompleteTask(_) => "Complete Task",
            TaskOperation::CompleteTasks(_) => "Complete Tasks",
            TaskOperation::DeleteTask(_) => "Delete Task",
            TaskOperation::DeleteTasks(_) => "Delete Tasks",
        }
    }
}

/// Persisted form of a job, stored as the ledger record payload
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobPayload {
    credentials: Credentials,
    operation: TaskOperation,
}

/// A unit of work for the execution queue
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub credentials: Credentials,
    pub operation: TaskOperation,
}

impl Job {
    /// New job with a time-ordered id
    pub fn new(credentials: Credentials, operation: TaskOperation) -> Self {
        Self {
            id: Uuid::now_v7(),
            credentials,
            operation,
        }
    }

    pub fn name(&self) -> &'static str {
        self.operation.name()
    }

    /// Pending ledger record carrying everything needed to rebuild this job
    pub fn to_record(&self) -> serde_json::Result<JobRecord> {
        let payload = serde_json::to_value(JobPayload {
            credentials: self.credentials.clone(),
            operation: self.operation.clone(),
        })?;
        Ok(JobRecord::pending(self.id, self.name(), Some(payload)))
    }

    /// Rebuild a job from a ledger record
    pub fn from_record(record: &JobRecord) -> Result<Self, QueueError> {
        let payload = record
            .payload
            .clone()
            .ok_or_else(|| QueueError::UnrecoverableJob("record has no payload".to_string()))?;
        let payload: JobPayload = serde_json::from_value(payload)
            .map_err(|e| QueueError::UnrecoverableJob(format!("undecodable payload: {e}")))?;

        Ok(Self {
            id: record.id,
            credentials: payload.credentials,
            operation: payload.operation,
        })
    }
}
