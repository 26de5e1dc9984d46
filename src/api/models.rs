use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ledger::LedgerStats;
use crate::observability::MetricsSnapshot;

/// Reply to every accepted mutation
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct JobAcceptedResponse {
    pub job_id: String,
    pub job: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct QueueHealth {
    pub accepting: bool,
    pub durable: bool,
    pub outstanding: usize,
    pub capacity: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub queue: QueueHealth,
    pub connections: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger: Option<LedgerStats>,
    pub metrics: MetricsSnapshot,
    pub version: String,
}

/// `GET /sync/logs` query
#[derive(Debug, Deserialize, Default)]
pub struct SyncLogsQuery {
    pub last: Option<usize>,
}

/// `GET /tasks` query; `sort=priority` orders high to low
#[derive(Debug, Deserialize, Default)]
pub struct TasksQuery {
    pub sort: Option<String>,
}
