//! Forwarding of a job's emitted units onto an SSE response.
//!
//! - [`coordinator`] - drives a job's emission stream from a background task
//!   and forwards each unit as an SSE event through a bounded channel.

pub mod coordinator;
