//! ## Structure
//!
//! - [`config`] - CLI/env configuration.
//! - [`session`] - submit, stream and cancel against the job API.
//! - [`sse`] - incremental `text/event-stream` decoding.

pub mod config;
pub mod session;
pub mod sse;
