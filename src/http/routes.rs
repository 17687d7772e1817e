//! HTTP API route definitions.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use super::auth::{auth_middleware, AuthState};
use super::handlers::{self, AppState};

/// Build the API router with all routes mounted under /api/v1.
pub fn create_router(app_state: AppState, auth_state: AuthState) -> Router {
    let api_v1 = Router::new()
        // Health check (no auth required)
        .route("/health", get(handlers::health))
        // Protected routes
        .route("/status", get(handlers::status))
        // The first segment is the job type on POST and the job id on
        // the read/cancel routes; the router needs one shared name.
        .route("/jobs/:job", post(handlers::create_job))
        .route("/jobs/:job/status", get(handlers::job_status))
        .route("/jobs/:job/updates", get(handlers::job_updates_sse))
        .route("/jobs/:job/files", get(handlers::job_files))
        .route("/jobs/:job/files/:name", get(handlers::download_file))
        .route("/jobs/:job/cancel", post(handlers::cancel_job))
        .layer(middleware::from_fn_with_state(
            auth_state.clone(),
            auth_middleware,
        ))
        .with_state(app_state);

    Router::new().nest("/api/v1", api_v1)
}
