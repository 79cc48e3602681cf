//! Producer API controller: enqueue, schedule, results, and inspection.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use relayq_engine::{Priority, QueueError, Task, TaskId};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info};

/// Maximum number of tasks returned by `GET /tasks`.
const INSPECT_LIMIT: i64 = 50;

/// Builds the producer API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/enqueue", post(enqueue))
        .route("/schedule", post(schedule))
        .route("/result", get(result))
        .route("/stats", get(stats))
        .route("/tasks", get(tasks))
}

/// Body of `POST /enqueue`.
#[derive(Debug, Deserialize)]
struct EnqueueRequest {
    #[serde(rename = "type")]
    task_type: String,
    #[serde(default)]
    payload: Value,
    priority: Option<u8>,
}

/// Body of `POST /schedule`.
#[derive(Debug, Deserialize)]
struct ScheduleRequest {
    spec: String,
    #[serde(rename = "type")]
    task_type: String,
    #[serde(default)]
    payload: Value,
    priority: Option<u8>,
}

/// Query parameters of `GET /result`.
#[derive(Debug, Deserialize)]
struct ResultParams {
    id: Option<String>,
}

/// Query parameters of `GET /tasks`.
#[derive(Debug, Deserialize)]
struct TasksParams {
    queue: Option<String>,
}

// Bodies are decoded by hand so any malformed body is a uniform 400.

async fn enqueue(State(state): State<AppState>, body: Bytes) -> Response {
    let request: EnqueueRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("{}\n", e)).into_response(),
    };

    let priority = request.priority.map(Priority::from).unwrap_or_default();
    let task = Task::new(request.task_type, request.payload, priority);

    match state.engine.enqueue(&task).await {
        Ok(()) => {
            info!(task_id = %task.id, task_type = %task.task_type, "Task accepted");
            (StatusCode::OK, format!("Task enqueued: {}\n", task.id)).into_response()
        }
        Err(e) => {
            error!(error = %e, "Enqueue failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{}\n", e)).into_response()
        }
    }
}

async fn schedule(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ScheduleRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("{}\n", e)).into_response(),
    };

    let priority = request.priority.map(Priority::from).unwrap_or_default();
    let template = Task::new(request.task_type, request.payload, priority);

    match state.cron.schedule(&request.spec, template) {
        Ok(entry_id) => {
            info!(entry_id, spec = %request.spec, "Cron entry registered");
            (
                StatusCode::OK,
                format!("Job scheduled with EntryID: {}\n", entry_id),
            )
                .into_response()
        }
        Err(QueueError::InvalidSchedule(message)) => (
            StatusCode::BAD_REQUEST,
            format!("Invalid cron spec: {}\n", message),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Schedule failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{}\n", e)).into_response()
        }
    }
}

async fn result(State(state): State<AppState>, Query(params): Query<ResultParams>) -> Response {
    let Some(id) = params.id.filter(|id| !id.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing task ID\n").into_response();
    };

    match state.results.get_result(&TaskId::from_string(id)).await {
        Ok(Some(raw)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            raw,
        )
            .into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Result not found\n").into_response(),
        Err(e) => {
            error!(error = %e, "Result lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{}\n", e)).into_response()
        }
    }
}

async fn stats(State(state): State<AppState>) -> Response {
    match state.engine.queue_depths().await {
        Ok(depths) => Json(depths).into_response(),
        Err(e) => {
            error!(error = %e, "Stats collection failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{}\n", e)).into_response()
        }
    }
}

async fn tasks(State(state): State<AppState>, Query(params): Query<TasksParams>) -> Response {
    let Some(queue) = params.queue.filter(|queue| !queue.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing queue parameter\n").into_response();
    };

    match state.engine.inspect(&queue, INSPECT_LIMIT).await {
        Ok(tasks) => Json(tasks).into_response(),
        Err(e) => {
            error!(error = %e, queue = %queue, "Queue inspection failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{}\n", e)).into_response()
        }
    }
}
