//! One submit/stream/cancel conversation with the job service.
//!
//! The stream has no end-of-job marker: the server simply closes the
//! connection. A connection that stays open but silent for longer than the
//! idle window is treated the same way, as a completed job.

use crate::client::{config::ClientConfig, sse::SseDecoder};
use anyhow::{Context, anyhow};
use core::fmt;
use futures::StreamExt;
use longjob_core::JobId;
use reqwest::{StatusCode, header};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, timeout_at};

/// Units received so far against the number the job is expected to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub received: usize,
    pub expected: usize,
}

impl Progress {
    /// Completion estimate, capped at 100.
    pub fn percent(&self) -> usize {
        if self.expected == 0 {
            return 100;
        }
        (self.received * 100 / self.expected).min(100)
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({}%)", self.received, self.expected, self.percent())
    }
}

/// Why a stream stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server closed the response.
    Closed,
    /// Nothing arrived within the idle window.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    AlreadyFinished,
}

#[derive(Serialize)]
struct CreateJobRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobResponse {
    job_id: JobId,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    http: reqwest::Client,
    config: ClientConfig,
}

impl Session {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// Submits `text` and returns the new job's id.
    pub async fn submit(&self, text: &str) -> anyhow::Result<JobId> {
        let response = self
            .http
            .post(self.url("/jobs"))
            .json(&CreateJobRequest { text })
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.config.base_url))?;

        if response.status() != StatusCode::CREATED {
            return Err(api_error(response).await);
        }
        let body: CreateJobResponse = response
            .json()
            .await
            .context("unexpected response to job submission")?;
        tracing::debug!(job_id = %body.job_id, "Job submitted");
        Ok(body.job_id)
    }

    /// Streams the job's output, calling `on_unit` for every character as it
    /// arrives.
    ///
    /// `expected` is the number of units the job should emit (see
    /// [`longjob_core::output_len`]) and only feeds the progress estimate.
    pub async fn stream<F>(
        &self,
        job_id: JobId,
        expected: usize,
        mut on_unit: F,
    ) -> anyhow::Result<(StreamEnd, Progress)>
    where
        F: FnMut(char, Progress),
    {
        let response = self
            .http
            .get(self.url(&format!("/jobs/{job_id}/stream")))
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .with_context(|| format!("failed to open the stream of job {job_id}"))?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut progress = Progress {
            received: 0,
            expected,
        };
        let mut deliver = |data: &str, progress: &mut Progress| {
            for ch in data.chars() {
                progress.received += 1;
                on_unit(ch, *progress);
            }
        };

        let idle = self.config.idle_timeout;
        let mut deadline = Instant::now() + idle;
        loop {
            let chunk = match timeout_at(deadline, body.next()).await {
                Err(_) => {
                    tracing::debug!(%job_id, %progress, "No event within {idle:?}, assuming completion");
                    return Ok((StreamEnd::Idle, progress));
                }
                Ok(None) => break,
                Ok(Some(chunk)) => chunk.context("stream interrupted")?,
            };

            let events = decoder.feed(&chunk);
            if !events.is_empty() {
                deadline = Instant::now() + idle;
            }
            for data in events {
                deliver(&data, &mut progress);
            }
        }
        if let Some(data) = decoder.finish() {
            deliver(&data, &mut progress);
        }

        tracing::debug!(%job_id, %progress, "Stream closed by the server");
        Ok((StreamEnd::Closed, progress))
    }

    /// Asks the server to cancel the job.
    pub async fn cancel(&self, job_id: JobId) -> anyhow::Result<CancelOutcome> {
        let response = self
            .http
            .delete(self.url(&format!("/jobs/{job_id}")))
            .send()
            .await
            .with_context(|| format!("failed to cancel job {job_id}"))?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(CancelOutcome::Cancelled),
            StatusCode::NOT_FOUND => Ok(CancelOutcome::AlreadyFinished),
            _ => Err(api_error(response).await),
        }
    }
}

/// Turns an unexpected response into an error carrying the server's message.
async fn api_error(response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    anyhow!("server answered {status}: {message}")
}
