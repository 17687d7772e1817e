//! Job handlers: create, status, files, download, cancel, SSE updates.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use tokio_stream::StreamExt as _;
use tracing::{debug, info, warn};

use crate::engine::job::JobId;
use crate::engine::progress::ProgressEvent;
use crate::error::EngineError;

use super::super::types::*;
use super::AppState;

/// Parse a job id path segment, or produce the error response.
fn parse_job_id(raw: &str) -> Result<JobId, Response> {
    JobId::parse(raw).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("INVALID_JOB_ID", "Invalid job ID format")),
        )
            .into_response()
    })
}

/// Map an engine error onto the API's status codes.
fn error_response(error: EngineError) -> Response {
    let (status, code) = match &error {
        EngineError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
        EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "JOB_NOT_FOUND"),
        EngineError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
        EngineError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
    };
    (status, Json(ErrorResponse::new(code, error.to_string()))).into_response()
}

/// `POST /jobs/:type` — create a job and start it immediately.
pub async fn create_job(
    State(state): State<AppState>,
    Path(job_type): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Response {
    debug!("HTTP create job request: type={job_type}");

    let job = match state.engine.create_job(&job_type, params) {
        Ok(job) => job,
        Err(e) => return error_response(e),
    };
    if let Err(e) = state.engine.start_job(job.id) {
        return error_response(e);
    }

    info!(job_id = %job.id, "job submitted via HTTP");
    (
        StatusCode::CREATED,
        Json(JobCreatedResponse {
            job_id: job.id.to_string(),
            status: job.status,
        }),
    )
        .into_response()
}

/// `GET /jobs/:id/status`
pub async fn job_status(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    let job_id = match parse_job_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.engine.job(job_id) {
        Ok(job) => (StatusCode::OK, Json(JobView::from(&job))).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /jobs/:id/files`
pub async fn job_files(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    let job_id = match parse_job_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.engine.job_files(job_id) {
        Ok(files) => (
            StatusCode::OK,
            Json(FilesResponse {
                job_id: job_id.to_string(),
                files: files.iter().map(FileRefView::from).collect(),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /jobs/:id/files/:name` — stream one result file back.
pub async fn download_file(
    State(state): State<AppState>,
    Path((job_id, name)): Path<(String, String)>,
) -> Response {
    let job_id = match parse_job_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let files = match state.engine.job_files(job_id) {
        Ok(files) => files,
        Err(e) => return error_response(e),
    };
    let Some(file) = files.iter().find(|f| f.name == name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                "FILE_NOT_FOUND",
                format!("Job {job_id} has no file '{name}'"),
            )),
        )
            .into_response();
    };

    match tokio::fs::read(&file.path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, file.content_type.clone()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", file.name),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            warn!(job_id = %job_id, "result file {} unreadable: {e}", file.path.display());
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::internal_error("Result file unreadable")),
            )
                .into_response()
        }
    }
}

/// `POST /jobs/:id/cancel`
pub async fn cancel_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    let job_id = match parse_job_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    debug!("HTTP cancel request: {job_id}");

    match state.engine.cancel_job(job_id) {
        Ok(cancelled) => match state.engine.job(job_id) {
            Ok(job) => (
                StatusCode::OK,
                Json(CancelResponse {
                    cancelled,
                    status: job.status,
                }),
            )
                .into_response(),
            Err(e) => error_response(e),
        },
        Err(e) => error_response(e),
    }
}

/// `GET /jobs/:id/updates` — SSE stream of progress events, closing once
/// the terminal event is delivered.
pub async fn job_updates_sse(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    let job_id = match parse_job_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let stream: std::pin::Pin<Box<dyn tokio_stream::Stream<Item = ProgressEvent> + Send>> =
        match state.engine.subscribe(job_id) {
            Ok(Some(stream)) => {
                info!(job_id = %job_id, "SSE client connected");
                Box::pin(stream)
            }
            // Job exists but is already terminal: close immediately, the
            // client gets current state from the status endpoint.
            Ok(None) => Box::pin(tokio_stream::empty()),
            Err(e) => return error_response(e),
        };

    let events = stream.map(|event| {
        let name = event.kind.event_name();
        match serde_json::to_string(&event) {
            Ok(json) => Ok::<_, Infallible>(Event::default().event(name).data(json)),
            Err(e) => {
                warn!("SSE serialization error: {e}");
                Ok(Event::default().event("error").data("{}"))
            }
        }
    });

    Sse::new(events)
        .keep_alive(KeepAlive::default().interval(Duration::from_secs(15)))
        .into_response()
}
