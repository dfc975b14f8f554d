//! Job lifecycle: creation, incremental emission and cancellation.
//!
//! A job moves through `LOOKUP -> STREAMING -> {COMPLETED | CANCELED}`:
//!
//! - [`JobOrchestrator::create_job`] computes the payload eagerly and
//!   registers it together with a fresh cancellation token.
//! - [`JobOrchestrator::emit`] returns a lazy stream that yields the payload
//!   one character at a time, waiting a (randomized) delay before each one.
//!   After every delay it checks the *joint* signal: the job's own token
//!   (explicit cancel) or the caller's token (typically tied to the lifetime
//!   of the connection). A delay already under way is never interrupted, but
//!   its character is dropped once the signal has fired.
//! - [`JobOrchestrator::cancel_job`] removes the job and triggers its token.
//!
//! The registry entry is removed exactly once no matter which path finishes
//! first. Cancel removes it eagerly; every other exit of the stream (natural
//! end, caller cancellation, the consumer dropping the stream, a panic while
//! polling) goes through a drop guard. Both paths call
//! [`JobRegistry::remove`], and only one of them can win.

use crate::{
    common::{
        error::{Error, Result},
        types::{JobId, Payload},
    },
    output::try_build_output,
    registry::{JobEntry, JobRegistry},
};
use core::time::Duration;
use futures::Stream;
use rand::Rng;
use std::{sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;

#[cfg(test)]
mod tests;

/// Bounds of the simulated per-character processing delay.
///
/// Each character waits a duration drawn uniformly from `min..=max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmitDelay {
    min: Duration,
    max: Duration,
}

impl EmitDelay {
    /// No delay at all. Characters are still produced one poll at a time.
    pub const ZERO: Self = Self::fixed(Duration::ZERO);

    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `min > max`.
    pub fn new(min: Duration, max: Duration) -> Result<Self> {
        if min > max {
            return Err(Error::InvalidArgument {
                reason: format!("minimum delay {min:?} exceeds maximum delay {max:?}"),
            });
        }
        Ok(Self { min, max })
    }

    pub const fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    pub const fn min(&self) -> Duration {
        self.min
    }

    pub const fn max(&self) -> Duration {
        self.max
    }

    /// Draws the delay for the next character.
    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rand::rng().random_range(self.min..=self.max)
    }
}

impl Default for EmitDelay {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(2),
        }
    }
}

/// Which side of the joint signal fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CancelSource {
    Job,
    External,
}

/// Logical OR of the job's token and the caller's token.
struct JointSignal {
    job: CancellationToken,
    external: CancellationToken,
}

impl JointSignal {
    /// The job side wins ties so an explicit cancel always ends the stream
    /// cleanly.
    fn fired(&self) -> Option<CancelSource> {
        if self.job.is_cancelled() {
            Some(CancelSource::Job)
        } else if self.external.is_cancelled() {
            Some(CancelSource::External)
        } else {
            None
        }
    }
}

/// Removes the job from the registry when the stream is finished with it.
///
/// Runs on every exit path of the emission loop, including the consumer
/// dropping the stream half way and unwinding.
struct Finalizer {
    registry: Arc<JobRegistry>,
    job_id: JobId,
}

impl Drop for Finalizer {
    fn drop(&mut self) {
        if self.registry.remove(&self.job_id) {
            tracing::debug!(job_id = %self.job_id, "Job removed from registry");
        }
    }
}

/// Creates, streams and cancels jobs held in a shared [`JobRegistry`].
///
/// Cloning is cheap; clones share the registry.
#[derive(Clone, Debug)]
pub struct JobOrchestrator {
    registry: Arc<JobRegistry>,
    delay: EmitDelay,
}

impl JobOrchestrator {
    /// Creates an orchestrator over a fresh, empty registry.
    pub fn new(delay: EmitDelay) -> Self {
        Self::with_registry(Arc::new(JobRegistry::new()), delay)
    }

    pub const fn with_registry(registry: Arc<JobRegistry>, delay: EmitDelay) -> Self {
        Self { registry, delay }
    }

    pub const fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub const fn delay(&self) -> EmitDelay {
        self.delay
    }

    /// Computes the output for `input` and registers it as a new job.
    ///
    /// The returned id was not registered at the time of the call, and the
    /// job is visible to [`emit`](Self::emit) as soon as this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `input` is absent. No job is
    /// created in that case.
    pub fn create_job<'a>(&self, input: impl Into<Option<&'a str>>) -> Result<JobId> {
        let input = input.into();
        let mut job_id = JobId::generate();

        tracing::info!(
            %job_id,
            input_len = input.map_or(0, str::len),
            "Starting new job"
        );

        let payload: Payload = try_build_output(input)?.chars().collect();
        let output_len = payload.len();

        while !self.registry.insert(job_id, JobEntry::new(Arc::clone(&payload))) {
            tracing::warn!(%job_id, "Job id collision, drawing a new one");
            job_id = JobId::generate();
        }

        tracing::debug!(%job_id, output_len, "Job stored");
        Ok(job_id)
    }

    /// Streams the output of `job_id`, one character per item.
    ///
    /// The stream is lazy: nothing happens until it is polled. Each character
    /// waits out its delay, then the joint signal is checked and the character
    /// is produced only if neither token fired. A cancel that lands during a
    /// delay lets that delay complete and ends the stream without producing
    /// the pending character.
    ///
    /// - Unknown job: the stream is empty.
    /// - Job cancelled through [`cancel_job`](Self::cancel_job): the stream
    ///   ends cleanly.
    /// - `external` cancelled: the stream yields a final
    ///   [`Error::RequestCancelled`] and ends.
    ///
    /// Whatever the outcome, the job is removed from the registry once the
    /// stream finishes or is dropped.
    pub fn emit(
        &self,
        job_id: JobId,
        external: CancellationToken,
    ) -> impl Stream<Item = Result<char>> + Send + use<> {
        let registry = Arc::clone(&self.registry);
        let delay = self.delay;

        async_stream::stream! {
            let Some(entry) = registry.try_get(&job_id) else {
                tracing::warn!(%job_id, "Stream requested for unknown job");
                return;
            };

            let _finalizer = Finalizer {
                registry: Arc::clone(&registry),
                job_id,
            };
            let signal = JointSignal {
                job: entry.cancel_token().clone(),
                external,
            };
            let payload = Arc::clone(entry.payload());

            tracing::info!(%job_id, output_len = payload.len(), "Streaming started");
            let start = Instant::now();

            for (emitted, &ch) in payload.iter().enumerate() {
                if signal.fired().is_none() {
                    tokio::time::sleep(delay.sample()).await;
                }
                // Checked again once the delay is over: nothing goes out after
                // either token fired.
                match signal.fired() {
                    None => yield Ok(ch),
                    Some(CancelSource::Job) => {
                        tracing::info!(%job_id, emitted, "Streaming stopped, job was cancelled");
                        return;
                    }
                    Some(CancelSource::External) => {
                        tracing::info!(%job_id, emitted, "Streaming stopped, request was cancelled");
                        yield Err(Error::RequestCancelled);
                        return;
                    }
                }
            }

            tracing::info!(
                %job_id,
                elapsed = ?start.elapsed(),
                "Streaming completed"
            );
        }
    }

    /// Cancels a job.
    ///
    /// Removes the job from the registry and triggers its token, which stops
    /// any stream currently emitting it. Returns `false`, with no other
    /// effect, if the job never existed, already completed, or was already
    /// cancelled.
    pub fn cancel_job(&self, job_id: &JobId) -> bool {
        match self.registry.take(job_id) {
            Some(entry) => {
                tracing::warn!(%job_id, "Cancel requested");
                entry.cancel_token().cancel();
                tracing::info!(%job_id, "Job canceled successfully");
                true
            }
            None => {
                tracing::warn!(%job_id, "Cancel requested for unknown job");
                false
            }
        }
    }
}
