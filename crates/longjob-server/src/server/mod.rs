//! HTTP transport for the job engine.
//!
//! ## Structure
//!
//! - [`config`] - CLI/env configuration and validation.
//! - [`error`] - mapping of domain errors onto HTTP responses.
//! - [`service`] - shared service state, route handlers and the router.
//! - [`streaming`] - forwarding of emitted units onto the SSE response.
//! - [`telemetry`] - logging, tracing and metrics setup.

pub mod config;
pub mod error;
pub mod service;
pub mod streaming;
pub mod telemetry;
