use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::partitions::JobState;

/// Durable lifecycle record for one submitted job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub name: String,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured job description, enough to rebuild and re-run the job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl JobRecord {
    /// New record in the pending state
    pub fn pending(id: Uuid, name: impl Into<String>, payload: Option<serde_json::Value>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            state: JobState::Pending,
            created_at: now,
            updated_at: now,
            error: None,
            payload,
        }
    }
}
