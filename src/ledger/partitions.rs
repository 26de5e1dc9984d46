/// Partition layout for the job ledger
///
/// Partition structure (one per lifecycle state):
/// - `pending`:    {job_id} -> JobRecord (JSON)
/// - `inprogress`: {job_id} -> JobRecord (JSON)
/// - `completed`:  {job_id} -> JobRecord (JSON)
/// - `failed`:     {job_id} -> JobRecord (JSON)
///
/// Keys are hyphenated UUID strings. Job ids are UUIDv7, so iterating a
/// partition in key order yields jobs in creation order.
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PENDING: &str = "pending";
pub const IN_PROGRESS: &str = "inprogress";
pub const COMPLETED: &str = "completed";
pub const FAILED: &str = "failed";

/// Lifecycle state of a persisted job; equal to the partition holding it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobState {
    pub const ALL: [JobState; 4] = [
        JobState::Pending,
        JobState::InProgress,
        JobState::Completed,
        JobState::Failed,
    ];

    /// Name of the partition that holds records in this state
    pub fn partition(&self) -> &'static str {
        match self {
            JobState::Pending => PENDING,
            JobState::InProgress => IN_PROGRESS,
            JobState::Completed => COMPLETED,
            JobState::Failed => FAILED,
        }
    }

    /// The only state a record may move into `self` from.
    ///
    /// `None` means no transition into this state is valid (records are
    /// only ever created as pending).
    pub fn required_source(&self) -> Option<JobState> {
        match self {
            JobState::Pending => None,
            JobState::InProgress => Some(JobState::Pending),
            JobState::Completed | JobState::Failed => Some(JobState::InProgress),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.partition())
    }
}

/// Encode a record key: {job_id}
pub fn encode_job_key(id: &Uuid) -> Vec<u8> {
    id.hyphenated().to_string().into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_key_encoding() {
        let id = Uuid::parse_str("0190f1c2-8a7b-7cde-8f01-23456789abcd").unwrap();
        let key = encode_job_key(&id);
        assert_eq!(key, b"0190f1c2-8a7b-7cde-8f01-23456789abcd");
    }

    #[test]
    fn test_transition_sources() {
        assert_eq!(JobState::Pending.required_source(), None);
        assert_eq!(JobState::InProgress.required_source(), Some(JobState::Pending));
        assert_eq!(JobState::Completed.required_source(), Some(JobState::InProgress));
        assert_eq!(JobState::Failed.required_source(), Some(JobState::InProgress));
    }

    #[test]
    fn test_partition_names() {
        let names: Vec<_> = JobState::ALL.iter().map(JobState::partition).collect();
        assert_eq!(names, vec!["pending", "inprogress", "completed", "failed"]);
    }
}
