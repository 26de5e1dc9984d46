//! Reading a user's tasks back out of `task export`

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::queue::{Annotation, Credentials, ExecError};

/// Compact timestamp format `task export` writes
const TASK_TIMESTAMP: &str = "%Y%m%dT%H%M%SZ";

/// One task as exported by the task manager
///
/// Attributes the export leaves out come back as empty values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub id: i32,
    pub description: String,
    pub project: String,
    pub tags: Vec<String>,
    pub status: String,
    pub uuid: String,
    pub urgency: f32,
    pub priority: String,
    pub due: String,
    pub start: String,
    pub end: String,
    pub entry: String,
    pub wait: String,
    pub modified: String,
    pub depends: Vec<String>,
    pub rtype: String,
    pub recur: String,
    pub annotations: Vec<Annotation>,
    #[serde(rename = "isPinned")]
    pub is_pinned: bool,
}

impl Task {
    fn due_at(&self) -> Option<DateTime<Utc>> {
        if self.due.is_empty() {
            return None;
        }
        NaiveDateTime::parse_from_str(&self.due, TASK_TIMESTAMP)
            .map(|naive| naive.and_utc())
            .or_else(|_| DateTime::parse_from_rfc3339(&self.due).map(|dt| dt.with_timezone(&Utc)))
            .ok()
    }
}

/// Read side of the task manager, kept apart from the job queue.
///
/// Reads never mutate the replica, so they do not wait behind queued jobs.
#[async_trait]
pub trait TaskReader: Send + Sync {
    async fn fetch_tasks(&self, credentials: &Credentials) -> Result<Vec<Task>, ExecError>;
}

/// Parse `task export` output and flag pending tasks already past due
pub fn parse_export(output: &[u8], now: DateTime<Utc>) -> Result<Vec<Task>, ExecError> {
    let mut tasks: Vec<Task> = serde_json::from_slice(output).map_err(ExecError::Export)?;
    mark_overdue(&mut tasks, now);
    Ok(tasks)
}

/// Pending tasks whose due date is before `now` become `overdue`.
///
/// A due date in neither export format is left alone.
pub fn mark_overdue(tasks: &mut [Task], now: DateTime<Utc>) {
    for task in tasks.iter_mut().filter(|task| task.status == "pending") {
        if task.due_at().is_some_and(|due| due < now) {
            task.status = "overdue".to_string();
        }
    }
}

fn priority_rank(priority: &str) -> u8 {
    match priority {
        "H" => 3,
        "M" => 2,
        "L" => 1,
        _ => 0,
    }
}

/// High, then medium, then low, then unprioritised; stable within a level
pub fn sort_by_priority(tasks: &mut [Task]) {
    tasks.sort_by_key(|task| std::cmp::Reverse(priority_rank(&task.priority)));
}
