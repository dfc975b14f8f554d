//! Job service state, HTTP handlers and routing.
//!
//! ## Structure
//!
//! - [`handler`] - [`JobService`](handler::JobService) and the route handlers.
//!
//! [`router`] mounts the job routes both under the configured API prefix and
//! at the root, plus a `/health` probe.

pub mod handler;


use axum::{
    Router,
    routing::{delete, get, post},
};
use handler::JobService;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

fn job_routes() -> Router<JobService> {
    Router::new()
        .route("/jobs", post(handler::create_job))
        .route("/jobs/{job_id}/stream", get(handler::stream_job))
        .route("/jobs/{job_id}", delete(handler::cancel_job))
}

/// Builds the application router around `service`.
pub fn router(service: JobService) -> Router {
    let prefix = service.config().api_prefix.clone();

    let mut app = Router::new()
        .route("/health", get(handler::health))
        .merge(job_routes());
    if !prefix.is_empty() {
        app = app.nest(&prefix, job_routes());
    }

    app.layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(service)
}
