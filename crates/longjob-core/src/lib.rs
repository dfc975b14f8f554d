#![doc = include_str!("../README.md")]

mod common;
pub mod orchestrator;
pub mod output;
pub mod registry;

pub use common::*;
pub use orchestrator::{EmitDelay, JobOrchestrator};
pub use output::{build_output, normalize_input, output_len, try_build_output};
pub use registry::{JobEntry, JobRegistry};
