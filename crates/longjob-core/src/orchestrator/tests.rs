use super::*;
use crate::output::build_output;
use core::pin::pin;
use futures::{StreamExt, future::join_all};
use std::sync::atomic::{AtomicUsize, Ordering};

const STEP: Duration = Duration::from_millis(10);

fn chars(s: &str) -> Vec<char> {
    s.chars().collect()
}

/// Drains a stream, splitting produced characters from the optional trailing
/// error.
async fn drain(stream: impl Stream<Item = Result<char>>) -> (Vec<char>, Option<Error>) {
    let mut stream = pin!(stream);
    let mut out = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(ch) => out.push(ch),
            Err(e) => {
                assert!(stream.next().await.is_none(), "items after an error");
                return (out, Some(e));
            }
        }
    }
    (out, None)
}

fn assert_prefix(produced: &[char], payload: &[char]) {
    assert!(produced.len() <= payload.len());
    assert_eq!(produced, &payload[..produced.len()], "not a prefix of the payload");
}

#[test]
fn delay_bounds_are_validated() {
    assert!(EmitDelay::new(STEP, STEP).is_ok());
    assert!(matches!(
        EmitDelay::new(STEP * 2, STEP),
        Err(Error::InvalidArgument { .. })
    ));
}

#[test]
fn delay_samples_stay_in_bounds() {
    let delay = EmitDelay::new(Duration::from_millis(5), Duration::from_millis(9)).unwrap();
    for _ in 0..1_000 {
        let d = delay.sample();
        assert!(d >= delay.min() && d <= delay.max(), "{d:?}");
    }
    assert_eq!(EmitDelay::fixed(STEP).sample(), STEP);
    assert_eq!(EmitDelay::ZERO.sample(), Duration::ZERO);
}

#[test]
fn create_job_registers_a_fresh_id() {
    let orchestrator = JobOrchestrator::new(EmitDelay::ZERO);
    let registry = orchestrator.registry();

    let a = orchestrator.create_job("aab").unwrap();
    let b = orchestrator.create_job("aab").unwrap();

    assert_ne!(a, b);
    assert_eq!(registry.len(), 2);
    let entry = registry.try_get(&a).unwrap();
    assert_eq!(entry.payload().as_ref(), chars("a2b1/YWFi").as_slice());
    assert!(!entry.cancel_token().is_cancelled());
}

#[test]
fn create_job_rejects_absent_input_without_registering() {
    let orchestrator = JobOrchestrator::new(EmitDelay::ZERO);

    assert!(matches!(
        orchestrator.create_job(None),
        Err(Error::InvalidArgument { .. })
    ));
    assert!(orchestrator.registry().is_empty());

    // The empty string is a valid, distinct input.
    let id = orchestrator.create_job("").unwrap();
    let entry = orchestrator.registry().try_get(&id).unwrap();
    assert_eq!(entry.payload().as_ref(), &['/']);
}

#[tokio::test]
async fn emit_streams_the_full_payload_and_cleans_up() {
    let orchestrator = JobOrchestrator::new(EmitDelay::ZERO);
    let job_id = orchestrator.create_job("Hello, world").unwrap();

    let (produced, err) = drain(orchestrator.emit(job_id, CancellationToken::new())).await;

    assert_eq!(produced, chars(&build_output("Hello, world")));
    assert!(err.is_none());
    assert!(!orchestrator.registry().contains(&job_id));
    // Already cleaned up by the completed stream.
    assert!(!orchestrator.cancel_job(&job_id));
}

#[tokio::test]
async fn emit_is_not_restartable() {
    let orchestrator = JobOrchestrator::new(EmitDelay::ZERO);
    let job_id = orchestrator.create_job("x").unwrap();

    let (first, _) = drain(orchestrator.emit(job_id, CancellationToken::new())).await;
    let (second, err) = drain(orchestrator.emit(job_id, CancellationToken::new())).await;

    assert_eq!(first, chars("x1/eA=="));
    assert!(second.is_empty());
    assert!(err.is_none());
}

#[tokio::test]
async fn emit_unknown_job_is_empty_without_side_effects() {
    let orchestrator = JobOrchestrator::new(EmitDelay::ZERO);
    let known = orchestrator.create_job("abc").unwrap();

    let (produced, err) = drain(orchestrator.emit(JobId::generate(), CancellationToken::new())).await;

    assert!(produced.is_empty());
    assert!(err.is_none());
    assert_eq!(orchestrator.registry().len(), 1);
    assert!(orchestrator.registry().contains(&known));
}

#[tokio::test]
async fn emit_is_lazy() {
    let orchestrator = JobOrchestrator::new(EmitDelay::ZERO);
    let job_id = orchestrator.create_job("abc").unwrap();

    let stream = orchestrator.emit(job_id, CancellationToken::new());
    // Building a stream neither looks the job up nor removes it; dropping an
    // unpolled stream leaves the job in place.
    drop(stream);

    assert!(orchestrator.registry().contains(&job_id));
}

#[tokio::test]
async fn cancel_before_streaming_yields_nothing() {
    let orchestrator = JobOrchestrator::new(EmitDelay::ZERO);
    let job_id = orchestrator.create_job("abc").unwrap();

    assert!(orchestrator.cancel_job(&job_id));
    let (produced, err) = drain(orchestrator.emit(job_id, CancellationToken::new())).await;

    assert!(produced.is_empty());
    assert!(err.is_none());
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let orchestrator = JobOrchestrator::new(EmitDelay::ZERO);
    let job_id = orchestrator.create_job("abc").unwrap();
    let token = orchestrator.registry().try_get(&job_id).unwrap().cancel_token().clone();

    assert!(orchestrator.cancel_job(&job_id));
    assert!(token.is_cancelled());
    assert!(!orchestrator.cancel_job(&job_id));
    assert!(!orchestrator.cancel_job(&JobId::generate()));
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_stream_stops_after_a_prefix() {
    let orchestrator = JobOrchestrator::new(EmitDelay::fixed(STEP));
    let job_id = orchestrator.create_job("abcdef").unwrap();
    let payload = chars(&build_output("abcdef"));

    let mut stream = pin!(orchestrator.emit(job_id, CancellationToken::new()));
    let mut produced = vec![
        stream.next().await.unwrap().unwrap(),
        stream.next().await.unwrap().unwrap(),
    ];

    assert!(orchestrator.cancel_job(&job_id));
    while let Some(item) = stream.next().await {
        produced.push(item.unwrap());
    }

    assert_eq!(produced.len(), 2);
    assert_prefix(&produced, &payload);
}

/// Spawns a consumer that records each character as it arrives and reports
/// what it got, how the stream ended, and when.
fn spawn_consumer(
    stream: impl Stream<Item = Result<char>> + Send + 'static,
    received: Arc<AtomicUsize>,
) -> tokio::task::JoinHandle<(Vec<char>, Option<Error>, tokio::time::Instant)> {
    tokio::spawn(async move {
        let mut stream = pin!(stream);
        let mut produced = Vec::new();
        let mut err = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(ch) => {
                    produced.push(ch);
                    received.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => err = Some(e),
            }
        }
        (produced, err, tokio::time::Instant::now())
    })
}

#[tokio::test(start_paused = true)]
async fn cancel_during_a_delay_stops_once_the_delay_completes() {
    let orchestrator = JobOrchestrator::new(EmitDelay::fixed(STEP * 100));
    let job_id = orchestrator.create_job("abc").unwrap();
    let payload = chars(&build_output("abc"));
    let received = Arc::new(AtomicUsize::new(0));
    let started = tokio::time::Instant::now();

    let consumer = spawn_consumer(
        orchestrator.emit(job_id, CancellationToken::new()),
        Arc::clone(&received),
    );

    // Two characters in, then cancel half way through the third delay.
    tokio::time::sleep(STEP * 250).await;
    let seen_at_cancel = received.load(Ordering::SeqCst);
    assert!(orchestrator.cancel_job(&job_id));
    let (produced, err, ended) = consumer.await.unwrap();

    assert_eq!(seen_at_cancel, 2);
    assert_eq!(produced.len(), seen_at_cancel, "character produced after the cancel");
    assert_prefix(&produced, &payload);
    assert!(err.is_none());
    // The delay under way was not cut short.
    assert!(ended - started >= STEP * 300);
    assert!(!orchestrator.registry().contains(&job_id));
}

#[tokio::test(start_paused = true)]
async fn external_cancel_during_a_delay_stops_once_the_delay_completes() {
    let orchestrator = JobOrchestrator::new(EmitDelay::fixed(STEP * 100));
    let job_id = orchestrator.create_job("abc").unwrap();
    let payload = chars(&build_output("abc"));
    let received = Arc::new(AtomicUsize::new(0));
    let external = CancellationToken::new();
    let started = tokio::time::Instant::now();

    let consumer = spawn_consumer(
        orchestrator.emit(job_id, external.clone()),
        Arc::clone(&received),
    );

    tokio::time::sleep(STEP * 250).await;
    let seen_at_cancel = received.load(Ordering::SeqCst);
    external.cancel();
    let (produced, err, ended) = consumer.await.unwrap();

    assert_eq!(seen_at_cancel, 2);
    assert_eq!(produced.len(), seen_at_cancel, "character produced after the cancel");
    assert_prefix(&produced, &payload);
    assert_eq!(err, Some(Error::RequestCancelled));
    assert!(ended - started >= STEP * 300);
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn pending_character_is_dropped_when_cancelled_mid_delay() {
    let orchestrator = JobOrchestrator::new(EmitDelay::fixed(STEP * 100));
    let job_id = orchestrator.create_job("abc").unwrap();

    let mut stream = pin!(orchestrator.emit(job_id, CancellationToken::new()));
    assert_eq!(stream.next().await, Some(Ok('a')));

    let (next, cancelled) = tokio::join!(stream.next(), async {
        tokio::time::sleep(STEP * 50).await;
        orchestrator.cancel_job(&job_id)
    });

    assert!(cancelled);
    assert_eq!(next, None);
}

#[tokio::test(start_paused = true)]
async fn external_cancel_surfaces_request_cancelled() {
    let orchestrator = JobOrchestrator::new(EmitDelay::fixed(STEP));
    let job_id = orchestrator.create_job("abc").unwrap();
    let external = CancellationToken::new();

    let mut stream = pin!(orchestrator.emit(job_id, external.clone()));
    let first = stream.next().await.unwrap().unwrap();
    external.cancel();

    assert_eq!(first, 'a');
    assert_eq!(stream.next().await, Some(Err(Error::RequestCancelled)));
    assert_eq!(stream.next().await, None);
    // The stream still owns cleanup on this path.
    assert!(!orchestrator.registry().contains(&job_id));
    assert!(!orchestrator.cancel_job(&job_id));
}

#[tokio::test]
async fn external_cancel_before_streaming_produces_no_characters() {
    let orchestrator = JobOrchestrator::new(EmitDelay::ZERO);
    let job_id = orchestrator.create_job("abc").unwrap();
    let external = CancellationToken::new();
    external.cancel();

    let (produced, err) = drain(orchestrator.emit(job_id, external)).await;

    assert!(produced.is_empty());
    assert_eq!(err, Some(Error::RequestCancelled));
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test]
async fn job_cancel_wins_when_both_signals_are_set() {
    let orchestrator = JobOrchestrator::new(EmitDelay::ZERO);
    let job_id = orchestrator.create_job("abc").unwrap();
    let external = CancellationToken::new();

    let stream = orchestrator.emit(job_id, external.clone());
    let mut stream = pin!(stream);
    assert!(stream.next().await.unwrap().is_ok());

    external.cancel();
    orchestrator.cancel_job(&job_id);

    assert_eq!(stream.next().await, None);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_stream_removes_the_job() {
    let orchestrator = JobOrchestrator::new(EmitDelay::fixed(STEP));
    let job_id = orchestrator.create_job("abcdef").unwrap();

    {
        let mut stream = pin!(orchestrator.emit(job_id, CancellationToken::new()));
        assert_eq!(stream.next().await, Some(Ok('a')));
        assert!(orchestrator.registry().contains(&job_id));
    }

    assert!(!orchestrator.registry().contains(&job_id));
    assert!(!orchestrator.cancel_job(&job_id));
}

#[tokio::test(start_paused = true)]
async fn completion_does_not_trigger_the_job_token() {
    let orchestrator = JobOrchestrator::new(EmitDelay::fixed(STEP));
    let job_id = orchestrator.create_job("ab").unwrap();
    let token = orchestrator.registry().try_get(&job_id).unwrap().cancel_token().clone();

    let (produced, _) = drain(orchestrator.emit(job_id, CancellationToken::new())).await;

    assert_eq!(produced, chars(&build_output("ab")));
    assert!(!token.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn second_stream_on_a_streaming_job_is_tolerated() {
    let orchestrator = JobOrchestrator::new(EmitDelay::fixed(STEP));
    let job_id = orchestrator.create_job("ab").unwrap();
    let payload = chars(&build_output("ab"));

    let (a, b) = tokio::join!(
        drain(orchestrator.emit(job_id, CancellationToken::new())),
        drain(orchestrator.emit(job_id, CancellationToken::new())),
    );

    assert_eq!(a.0, payload);
    assert_eq!(b.0, payload);
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cancel_and_emit_race_safely() {
    const JOBS: usize = 64;

    let orchestrator = JobOrchestrator::new(EmitDelay::fixed(Duration::from_micros(50)));
    let payload = chars(&build_output("race me"));

    let races = (0..JOBS).map(|i| {
        let orchestrator = orchestrator.clone();
        async move {
            let job_id = orchestrator.create_job("race me").unwrap();
            let token = orchestrator.registry().try_get(&job_id).unwrap().cancel_token().clone();
            let received = Arc::new(AtomicUsize::new(0));

            let streamer = {
                let stream = orchestrator.emit(job_id, CancellationToken::new());
                let received = Arc::clone(&received);
                tokio::spawn(async move {
                    let mut stream = pin!(stream);
                    let mut produced = Vec::new();
                    let mut after_cancel = 0;
                    loop {
                        // A poll that starts with the token already fired
                        // must not produce anything.
                        let fired_before_poll = token.is_cancelled();
                        let Some(item) = stream.next().await else {
                            break;
                        };
                        let ch = item.unwrap();
                        if fired_before_poll {
                            after_cancel += 1;
                        }
                        produced.push(ch);
                        received.fetch_add(1, Ordering::SeqCst);
                    }
                    (produced, after_cancel)
                })
            };
            let canceller = {
                let orchestrator = orchestrator.clone();
                let received = Arc::clone(&received);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_micros(50 * (i as u64 % 8))).await;
                    let cancelled = orchestrator.cancel_job(&job_id);
                    (cancelled, received.load(Ordering::SeqCst))
                })
            };

            let (produced, after_cancel) = streamer.await.unwrap();
            let (cancelled, seen_at_cancel) = canceller.await.unwrap();
            (job_id, produced, after_cancel, cancelled, seen_at_cancel)
        }
    });

    for (job_id, produced, after_cancel, cancelled, seen_at_cancel) in join_all(races).await {
        assert_prefix(&produced, &payload);
        assert_eq!(after_cancel, 0, "{job_id} produced characters after the cancel");
        if cancelled {
            // At most the character that passed its final check as the
            // cancel landed can still be on its way to the consumer.
            assert!(produced.len() <= seen_at_cancel + 1, "{job_id}");
        }
        if produced.len() < payload.len() {
            // Stopping early is only ever caused by the cancel winning.
            assert!(cancelled, "{job_id} stopped early without a cancel");
        }
        assert!(!orchestrator.registry().contains(&job_id));
    }
    assert!(orchestrator.registry().is_empty());
}
