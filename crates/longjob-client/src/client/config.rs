use anyhow::bail;
use clap::Parser;
use core::time::Duration;

/// Command-line interface of the `longjob-client` binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "longjob-client",
    version,
    about = "Submit text to a longjob server and watch the output stream in"
)]
pub struct CliArgs {
    /// Text to process. Read from stdin when omitted.
    pub text: Option<String>,

    /// Base URL of the job API, including the route prefix.
    ///
    /// Environment variable: `LONGJOB_URL`
    #[arg(long, env = "LONGJOB_URL", default_value_t = String::from("http://127.0.0.1:8080/api"))]
    pub url: String,

    /// Milliseconds of silence after which the stream is considered complete.
    ///
    /// Environment variable: `IDLE_TIMEOUT_MS`
    #[arg(long, env = "IDLE_TIMEOUT_MS", default_value_t = 7_000)]
    pub idle_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub idle_timeout: Duration,
}

impl TryFrom<&CliArgs> for ClientConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CliArgs) -> Result<Self, Self::Error> {
        if args.idle_timeout_ms == 0 {
            bail!("IDLE_TIMEOUT_MS must be greater than 0");
        }

        let base_url = args.url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            bail!("LONGJOB_URL ({}) must be an http(s) URL", args.url);
        }

        Ok(Self {
            base_url: base_url.to_string(),
            idle_timeout: Duration::from_millis(args.idle_timeout_ms),
        })
    }
}
