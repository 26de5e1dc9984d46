use std::collections::HashMap;

use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::{info, warn};

use super::{
    error::ApiError,
    models::{HealthResponse, JobAcceptedResponse, QueueHealth, SyncLogsQuery, TasksQuery},
    state::AppState,
    utils::read_json,
    validation,
};
use crate::queue::{Job, NewTask, TaskEdit, TaskModification, TaskOperation, TaskRef, TaskRefs};
use crate::session::SessionUser;
use crate::synclog::LogEntry;
use crate::taskwarrior::{Task, sort_by_priority};

const DEFAULT_SYNC_LOGS: usize = 20;
const MAX_SYNC_LOGS: usize = 20;

/// Admit a job for `user` and reply 202 with its id.
///
/// Submission waits while the queue is full; the only synchronous failure
/// is a queue that has stopped accepting work.
async fn admit(
    state: &AppState,
    user: &SessionUser,
    operation: TaskOperation,
) -> Result<(StatusCode, Json<JobAcceptedResponse>), ApiError> {
    let job = Job::new(user.credentials(), operation);
    let name = job.name();

    let job_id = state.queue.submit(job).await?;
    info!(job_id = %job_id, job = name, client_id = %user.client_id, "Job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAcceptedResponse {
            job_id: job_id.to_string(),
            job: name.to_string(),
            status: "queued".to_string(),
        }),
    ))
}

/// `POST /add-task`
pub async fn add_task(
    State(state): State<AppState>,
    user: SessionUser,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let task: NewTask = read_json(&headers, body).await?;
    validation::validate_new_task(&task)?;
    admit(&state, &user, TaskOperation::AddTask(task)).await
}

/// `POST /edit-task`
pub async fn edit_task(
    State(state): State<AppState>,
    user: SessionUser,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let edit: TaskEdit = read_json(&headers, body).await?;
    validation::validate_edit(&edit)?;
    admit(&state, &user, TaskOperation::EditTask(edit)).await
}

/// `POST /modify-task`
pub async fn modify_task(
    State(state): State<AppState>,
    user: SessionUser,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let modification: TaskModification = read_json(&headers, body).await?;
    validation::validate_modification(&modification)?;
    admit(&state, &user, TaskOperation::ModifyTask(modification)).await
}

pub async fn complete_task(
    State(state): State<AppState>,
    user: SessionUser,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let task: TaskRef = read_json(&headers, body).await?;
    validation::validate_task_ref(&task)?;
    admit(&state, &user, TaskOperation::CompleteTask(task)).await
}

pub async fn complete_tasks(
    State(state): State<AppState>,
    user: SessionUser,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let tasks: TaskRefs = read_json(&headers, body).await?;
    validation::validate_task_refs(&tasks)?;
    admit(&state, &user, TaskOperation::CompleteTasks(tasks)).await
}

pub async fn delete_task(
    State(state): State<AppState>,
    user: SessionUser,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let task: TaskRef = read_json(&headers, body).await?;
    validation::validate_task_ref(&task)?;
    admit(&state, &user, TaskOperation::DeleteTask(task)).await
}

pub async fn delete_tasks(
    State(state): State<AppState>,
    user: SessionUser,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let tasks: TaskRefs = read_json(&headers, body).await?;
    validation::validate_task_refs(&tasks)?;
    admit(&state, &user, TaskOperation::DeleteTasks(tasks)).await
}

/// `GET /tasks?sort=priority`: the caller's tasks, read from the sync server.
///
/// Reads bypass the job queue and see whatever the last synced job left.
pub async fn list_tasks(
    State(state): State<AppState>,
    user: SessionUser,
    Query(query): Query<TasksQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let mut tasks = state
        .tasks
        .fetch_tasks(&user.credentials())
        .await
        .map_err(|e| {
            warn!(client_id = %user.client_id, error = %e, "Failed to fetch tasks");
            ApiError::Internal("failed to fetch tasks".to_string())
        })?;

    if query.sort.as_deref() == Some("priority") {
        sort_by_priority(&mut tasks);
    }

    Ok(Json(tasks))
}

/// `GET /sync/logs?last=N`: the caller's newest log entries, at most 20
pub async fn sync_logs(
    State(state): State<AppState>,
    user: SessionUser,
    Query(query): Query<SyncLogsQuery>,
) -> Json<Vec<LogEntry>> {
    let last = query
        .last
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_SYNC_LOGS)
        .min(MAX_SYNC_LOGS);

    Json(state.logs.recent_for(&user.client_id, last))
}

/// Health check endpoint
///
/// Returns 503 once the queue has stopped accepting work or the ledger
/// cannot be read.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();
    let mut healthy = true;

    let accepting = state.queue.is_accepting();
    components.insert(
        "queue".to_string(),
        if accepting { "ok" } else { "stopped" }.to_string(),
    );
    healthy &= accepting;

    let ledger = match &state.ledger {
        Some(ledger) => match ledger.stats() {
            Ok(stats) => {
                components.insert("ledger".to_string(), "ok".to_string());
                Some(stats)
            }
            Err(e) => {
                components.insert("ledger".to_string(), format!("error: {e}"));
                healthy = false;
                None
            }
        },
        None => {
            components.insert("ledger".to_string(), "disabled".to_string());
            None
        }
    };

    components.insert(
        "rate_limiter".to_string(),
        format!("{} clients tracked", state.limiter.tracked_keys()),
    );

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        components,
        queue: QueueHealth {
            accepting,
            durable: state.queue.is_durable(),
            outstanding: state.queue.outstanding(),
            capacity: state.queue.capacity(),
        },
        connections: state.broadcaster.connection_count(),
        ledger,
        metrics: state.metrics.snapshot(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status, Json(response))
}
