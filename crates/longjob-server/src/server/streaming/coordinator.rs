use axum::response::sse::Event;
use core::convert::Infallible;
use futures::{Stream, StreamExt};
use longjob_core::{Error, JobId, Result};
use tokio::sync::mpsc;

/// Renders one emitted unit as an SSE event whose data is exactly that unit.
///
/// A line feed is framed by SSE as two empty `data:` lines, which a
/// conforming client joins back into `"\n"`. Carriage returns cannot be
/// framed at all and are normalized away before jobs are created.
pub fn unit_event(unit: char) -> Event {
    let mut buf = [0_u8; 4];
    Event::default().data(&*unit.encode_utf8(&mut buf))
}

/// Drives a job's emission stream and forwards each unit to the response.
///
/// This is the bridge between [`JobOrchestrator::emit`] and the HTTP body:
/// it polls `units` to completion, converting each unit into an SSE event
/// and sending it down `resp_tx`. The response side owns the receiver, so
/// backpressure from a slow client reaches the emission loop through the
/// bounded channel.
///
/// # Arguments
///
/// - `job_id`: The job being streamed, used for logs.
/// - `units`: The job's emission stream.
/// - `resp_tx`: Channel feeding the SSE response body.
///
/// # Behavior
///
/// - Returns the number of units forwarded when the stream ends, whether it
///   completed or the job was cancelled.
/// - Returns [`Error::RequestCancelled`] when the request-scoped token fired,
///   i.e. the client disconnected or the server is shutting down.
/// - Returns [`Error::ChannelError`] if the response side went away before
///   the stream noticed. Dropping `units` on return lets the job engine clean
///   up in either case.
///
/// [`JobOrchestrator::emit`]: longjob_core::JobOrchestrator::emit
pub async fn feed_events<S>(
    job_id: JobId,
    units: S,
    resp_tx: mpsc::Sender<core::result::Result<Event, Infallible>>,
) -> Result<usize>
where
    S: Stream<Item = Result<char>>,
{
    let mut units = core::pin::pin!(units);
    let mut forwarded = 0;

    while let Some(unit) = units.next().await {
        let unit = match unit {
            Ok(unit) => unit,
            Err(e) => {
                tracing::debug!(%job_id, forwarded, "Emission ended early: {e}");
                return Err(e);
            }
        };

        if let Err(e) = resp_tx.send(Ok(unit_event(unit))).await {
            return Err(Error::ChannelError {
                context: format!("Failed to forward unit for job {job_id}: {e}"),
            });
        }
        forwarded += 1;
    }

    Ok(forwarded)
}
