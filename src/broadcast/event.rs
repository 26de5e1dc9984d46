use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status as seen by live observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Queued,
    InProgress,
    Success,
    Failure,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Queued => "queued",
            JobStatus::InProgress => "in-progress",
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
        };
        f.write_str(label)
    }
}

/// One frame on the live status stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusEvent {
    pub id: Uuid,
    pub job: String,
    pub status: JobStatus,
}

impl JobStatusEvent {
    pub fn new(id: Uuid, job: impl Into<String>, status: JobStatus) -> Self {
        Self {
            id,
            job: job.into(),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let id = Uuid::nil();
        let event = JobStatusEvent::new(id, "Add Task", JobStatus::InProgress);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["job"], "Add Task");
        assert_eq!(json["status"], "in-progress");
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn test_status_display_matches_wire() {
        for status in [
            JobStatus::Queued,
            JobStatus::InProgress,
            JobStatus::Success,
            JobStatus::Failure,
        ] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, status.to_string());
        }
    }
}
