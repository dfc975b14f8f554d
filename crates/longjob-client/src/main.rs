#![doc = include_str!("../README.md")]

mod client;

use anyhow::bail;
use clap::Parser;
use client::{
    config::{CliArgs, ClientConfig},
    session::{CancelOutcome, Session, StreamEnd},
};
use longjob_core::{normalize_input, output_len};
use std::io::Write;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let config = ClientConfig::try_from(&args)?;

    let raw = match args.text {
        Some(text) => text,
        None => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            text
        }
    };
    // The server normalizes the same way; the progress estimate must be
    // computed from the text the job is actually built from.
    let text = normalize_input(&raw);
    if text.is_empty() {
        bail!("nothing to submit: the text is empty");
    }

    let session = Session::new(config);
    let job_id = session.submit(&text).await?;
    eprintln!("job {job_id} accepted, streaming (Ctrl+C to cancel)");

    let mut stdout = std::io::stdout();
    let stream = session.stream(job_id, output_len(&text), |ch, _| {
        let _ = write!(stdout, "{ch}");
        let _ = stdout.flush();
    });

    tokio::select! {
        res = stream => {
            let (end, progress) = res?;
            println!();
            match end {
                StreamEnd::Closed => eprintln!("done {progress}"),
                StreamEnd::Idle => eprintln!("done {progress} (stream went idle)"),
            }
        }
        res = tokio::signal::ctrl_c() => {
            res?;
            println!();
            match session.cancel(job_id).await? {
                CancelOutcome::Cancelled => eprintln!("canceled"),
                CancelOutcome::AlreadyFinished => eprintln!("already finished"),
            }
        }
    }

    Ok(())
}
