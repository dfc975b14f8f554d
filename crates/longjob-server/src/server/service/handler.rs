//! HTTP handlers for creating, streaming and cancelling jobs.
//!
//! This module defines [`JobService`], the state shared by every request, and
//! the axum handlers mounted by [`router`](super::router). Handlers validate
//! their input before the job engine is touched: malformed job ids and bad
//! input text never reach the registry.
//!
//! ## Key Responsibilities
//!
//! - Validate and normalize `POST /jobs` bodies, then create the job.
//! - Stream a job as SSE, tying the emission to the lifetime of the response.
//! - Map `DELETE /jobs/{jobId}` onto a cancel.
//! - Refuse new work and drain in-flight streams during shutdown.

use crate::server::{
    config::ServerConfig,
    error::ApiError,
    streaming::coordinator::feed_events,
    telemetry::{
        decrement_streams_inflight, increment_chars_emitted, increment_jobs_cancelled,
        increment_jobs_created, increment_stream_errors, increment_streams_inflight,
        record_stream_duration,
    },
};
use axum::{
    Json,
    extract::{OriginalUri, Path, State, rejection::JsonRejection},
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response, sse::Sse},
};
use core::time::Duration;
use futures::StreamExt;
use longjob_core::{Error, JobId, JobOrchestrator, normalize_input};
use serde::{Deserialize, Serialize};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::{
    sync::mpsc,
    time::{sleep, timeout},
};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// State shared by all handlers.
///
/// Owns the job engine and the server's lifecycle: a root cancellation token
/// (every stream's request-scoped token is a child of it), a count of
/// in-flight streams and a "shutting down" flag.
#[derive(Clone)]
pub struct JobService {
    config: Arc<ServerConfig>,
    orchestrator: JobOrchestrator,
    shutdown_token: CancellationToken,
    streams_inflight: Arc<AtomicUsize>,
    shutting_down: Arc<AtomicBool>,
}

impl JobService {
    pub fn new(config: ServerConfig) -> Self {
        let orchestrator = JobOrchestrator::new(config.emit_delay);
        Self {
            config: Arc::new(config),
            orchestrator,
            shutdown_token: CancellationToken::new(),
            streams_inflight: Arc::new(AtomicUsize::new(0)),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub const fn orchestrator(&self) -> &JobOrchestrator {
        &self.orchestrator
    }

    pub fn streams_inflight(&self) -> usize {
        self.streams_inflight.load(Ordering::Acquire)
    }

    pub fn is_serving(&self) -> bool {
        !self.shutting_down.load(Ordering::Acquire)
    }

    fn ensure_serving(&self) -> Result<(), Error> {
        if self.is_serving() {
            Ok(())
        } else {
            Err(Error::ServiceShutdown)
        }
    }

    /// Gracefully shuts the service down.
    ///
    /// - Refuses new jobs and streams.
    /// - Waits up to `shutdown_timeout` for in-flight streams to drain.
    /// - Cancels every remaining stream through the root token.
    pub async fn shutdown(&self) {
        // === Phase 0: Stop accepting new requests ===
        tracing::info!("Refusing new requests");
        self.shutting_down.store(true, Ordering::Release);

        // === Phase 1: Wait for in-flight streams to drain ===
        tracing::info!(
            "Draining in-flight streams ({} active)",
            self.streams_inflight()
        );
        let drain_result = timeout(self.config.shutdown_timeout, async {
            while self.streams_inflight() > 0 {
                sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => tracing::debug!("All in-flight streams drained successfully"),
            Err(_) => tracing::warn!(
                "Graceful drain timed out ({} streams still active)",
                self.streams_inflight()
            ),
        }

        // === Phase 2: Cancel any remaining streams ===
        tracing::debug!("Cancelling remaining streams via shutdown token");
        self.shutdown_token.cancel();

        tracing::info!(
            "Job service shutdown complete ({} jobs discarded)",
            self.orchestrator.registry().len()
        );
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: JobId,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

fn validate_text(text: Option<&str>, max_chars: usize) -> Result<String, ApiError> {
    let text = normalize_input(text.unwrap_or_default());
    if text.is_empty() {
        return Err(ApiError::bad_request("Text is required and cannot be empty."));
    }
    if text.chars().count() > max_chars {
        return Err(ApiError::bad_request(format!(
            "Text too long (max {max_chars} characters)."
        )));
    }
    Ok(text)
}

/// `POST /jobs` - create a job from `{ "text": ... }`.
#[tracing::instrument(skip_all)]
pub async fn create_job(
    State(service): State<JobService>,
    OriginalUri(uri): OriginalUri,
    body: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    service.ensure_serving()?;
    let Json(req) = body?;
    let text = validate_text(req.text.as_deref(), service.config.max_text_chars)?;

    let job_id = service.orchestrator.create_job(text.as_str())?;
    increment_jobs_created();

    let location = format!("{}/{job_id}/stream", uri.path().trim_end_matches('/'));
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(CreateJobResponse { job_id }),
    )
        .into_response())
}

/// `GET /jobs/{jobId}/stream` - stream a job's output as server-sent events.
///
/// The emission runs in its own task and feeds the response through a
/// bounded channel. The request-scoped token handed to the job engine is
/// cancelled when the response body is dropped (client disconnect) or when
/// the server shuts down; the emission loop notices it before the next unit.
#[tracing::instrument(skip(service))]
pub async fn stream_job(
    State(service): State<JobService>,
    Path(job_id): Path<String>,
) -> Response {
    let job_id: JobId = match job_id.parse() {
        Ok(job_id) => job_id,
        Err(_) => {
            increment_stream_errors();
            return (StatusCode::BAD_REQUEST, "Invalid jobId format.").into_response();
        }
    };
    if let Err(e) = service.ensure_serving() {
        return ApiError::from(e).into_response();
    }

    let request_token = service.shutdown_token.child_token();
    let disconnect_guard = request_token.clone().drop_guard();

    let (resp_tx, resp_rx) = mpsc::channel(service.config.stream_buffer_size);
    let units = service.orchestrator.emit(job_id, request_token.clone());

    service.streams_inflight.fetch_add(1, Ordering::AcqRel);
    increment_streams_inflight();

    let streams_inflight = Arc::clone(&service.streams_inflight);
    let start = std::time::Instant::now();
    let fut = async move {
        match feed_events(job_id, units, resp_tx).await {
            Ok(emitted) => {
                increment_chars_emitted(u64::try_from(emitted).unwrap_or(u64::MAX));
                tracing::debug!(%job_id, emitted, "Stream closed");
            }
            // A unit that was already due when the client left fails to send
            // before the emission loop sees the cancelled token.
            Err(Error::RequestCancelled | Error::ChannelError { .. })
                if request_token.is_cancelled() =>
            {
                increment_stream_errors();
                tracing::info!(%job_id, "Stream aborted by the client or by shutdown");
            }
            Err(e) => {
                increment_stream_errors();
                tracing::warn!(%job_id, "Stream failed: {e}");
            }
        }
        streams_inflight.fetch_sub(1, Ordering::AcqRel);
        decrement_streams_inflight();
        record_stream_duration(start.elapsed().as_secs_f64() * 1_000.0);
    };
    tokio::spawn(fut.instrument(tracing::info_span!("streaming", %job_id)));

    // The guard rides along with the body; dropping the body cancels the
    // request token.
    let events = ReceiverStream::new(resp_rx).map(move |event| {
        let _guard = &disconnect_guard;
        event
    });

    ([(X_ACCEL_BUFFERING, "no")], Sse::new(events)).into_response()
}

/// `DELETE /jobs/{jobId}` - cancel a job.
#[tracing::instrument(skip(service))]
pub async fn cancel_job(
    State(service): State<JobService>,
    Path(job_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let job_id: JobId = job_id.parse()?;

    if service.orchestrator.cancel_job(&job_id) {
        increment_jobs_cancelled();
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::JobNotFound { job_id }.into())
    }
}

/// `GET /health` - liveness probe that flips to `503` during shutdown.
pub async fn health(State(service): State<JobService>) -> (StatusCode, Json<HealthResponse>) {
    if service.is_serving() {
        (StatusCode::OK, Json(HealthResponse { status: "serving" }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "not_serving",
            }),
        )
    }
}
