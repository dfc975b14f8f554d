//! Shared definitions used by the server, the client and the job engine.
//!
//! - [`error`]: the crate-wide [`Error`] type and [`Result`] alias.
//! - [`types`]: [`JobId`] and the [`Payload`] representation.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{JOB_ID_LEN, JobId, Payload};
