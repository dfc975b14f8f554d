//! Error types for the job service.
//!
//! This module defines the central `Error` enum shared by the job engine and
//! the HTTP transport. The engine itself only ever produces
//! [`Error::InvalidArgument`] (absent input) and [`Error::RequestCancelled`]
//! (the caller's cancellation signal ended a stream). The remaining variants
//! are raised by the transport layer, which maps every variant onto an HTTP
//! status code.
//!
//! ## Error Cases
//! - `InvalidArgument`: input to the output generator was absent.
//! - `InvalidRequest`: a request was malformed (bad job id, bad text).
//! - `JobNotFound`: a well-formed job id is not (or no longer) registered.
//! - `RequestCancelled`: the client aborted the request mid-stream.
//! - `ChannelError`: an internal communication failure between tasks.
//! - `ServiceShutdown`: a request arrived while the service was shutting down.

use crate::common::types::JobId;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the job service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// A required argument was absent.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The client request was invalid or exceeded constraints.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// No job is registered under this id.
    #[error("Job {job_id} not found or already completed")]
    JobNotFound { job_id: JobId },

    /// The client aborted the request.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// Internal channel send/receive failure (e.g., closed or full channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    pub(crate) fn absent(what: &str) -> Self {
        Self::InvalidArgument {
            reason: format!("{what} must be present"),
        }
    }

    /// Whether the error was caused by the caller rather than the service.
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. }
                | Self::InvalidRequest { .. }
                | Self::JobNotFound { .. }
                | Self::RequestCancelled
        )
    }
}
