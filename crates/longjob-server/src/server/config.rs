use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use longjob_core::EmitDelay;

/// Runtime configuration for the `longjob-server` binary.
///
/// These settings control input limits, the simulated per-character delay,
/// buffering and shutdown behavior of the job service. All values are parsed
/// from CLI arguments or environment variables, with defaults that match the
/// reference client.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "longjob-server",
    version,
    about = "An HTTP service that streams cancellable jobs over server-sent events"
)]
pub struct CliArgs {
    /// Maximum number of characters accepted in a job's (trimmed) input text.
    ///
    /// Environment variable: `MAX_TEXT_CHARS`
    #[arg(long, env = "MAX_TEXT_CHARS", default_value_t = 10_000)]
    pub max_text_chars: usize,

    /// Lower bound of the simulated processing delay before each emitted
    /// character, in milliseconds.
    ///
    /// Environment variable: `MIN_DELAY_MS`
    #[arg(long, env = "MIN_DELAY_MS", default_value_t = 1_000)]
    pub min_delay_ms: u64,

    /// Upper bound of the simulated processing delay before each emitted
    /// character, in milliseconds. Each delay is drawn uniformly from
    /// `MIN_DELAY_MS..=MAX_DELAY_MS`.
    ///
    /// Environment variable: `MAX_DELAY_MS`
    #[arg(long, env = "MAX_DELAY_MS", default_value_t = 2_000)]
    pub max_delay_ms: u64,

    /// Capacity of the buffer between a job's emission task and its HTTP
    /// response.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for in-flight streams to finish on shutdown before they
    /// are cancelled.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Path prefix the job routes are mounted under, in addition to the root.
    /// Use an empty string to serve only at the root.
    ///
    /// Environment variable: `API_PREFIX`
    #[arg(long, env = "API_PREFIX", default_value_t = String::from("/api"))]
    pub api_prefix: String,

    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:8080" or "/tmp/longjob.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_text_chars: usize,
    pub emit_delay: EmitDelay,
    pub stream_buffer_size: usize,
    pub shutdown_timeout: Duration,
    pub api_prefix: String,
    pub server_addr: String,
    pub uds: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_text_chars: 10_000,
            emit_delay: EmitDelay::default(),
            stream_buffer_size: 8,
            shutdown_timeout: Duration::from_secs(3),
            api_prefix: String::from("/api"),
            server_addr: String::from("0.0.0.0:8080"),
            uds: false,
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.max_text_chars == 0 {
            bail!("MAX_TEXT_CHARS must be greater than 0");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.min_delay_ms > args.max_delay_ms {
            bail!(
                "MIN_DELAY_MS ({}) must not exceed MAX_DELAY_MS ({})",
                args.min_delay_ms,
                args.max_delay_ms
            );
        }
        let emit_delay = EmitDelay::new(
            Duration::from_millis(args.min_delay_ms),
            Duration::from_millis(args.max_delay_ms),
        )?;

        Ok(Self {
            max_text_chars: args.max_text_chars,
            emit_delay,
            stream_buffer_size: args.stream_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            api_prefix: normalize_prefix(&args.api_prefix)?,
            server_addr: args.server_addr,
            uds: args.uds,
        })
    }
}

/// `""` and `"/"` mean "root only"; anything else must look like `/segment`.
fn normalize_prefix(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if !trimmed.starts_with('/') {
        bail!("API_PREFIX ({raw}) must start with '/'");
    }
    if trimmed.contains(['{', '}', '*']) {
        bail!("API_PREFIX ({raw}) must not contain route captures");
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let args = CliArgs::try_parse_from(std::iter::once("longjob-server").chain(args.iter().copied()))?;
        ServerConfig::try_from(args)
    }

    #[test]
    fn explicit_flags_are_applied() {
        let config = parse(&[
            "--min-delay-ms",
            "5",
            "--max-delay-ms",
            "10",
            "--max-text-chars",
            "42",
            "--api-prefix",
            "/v1/",
            "--server-addr",
            "127.0.0.1:9000",
        ])
        .unwrap();

        assert_eq!(config.emit_delay.min(), Duration::from_millis(5));
        assert_eq!(config.emit_delay.max(), Duration::from_millis(10));
        assert_eq!(config.max_text_chars, 42);
        assert_eq!(config.api_prefix, "/v1");
        assert_eq!(config.server_addr, "127.0.0.1:9000");
        assert!(!config.uds);
    }

    #[test]
    fn inverted_delay_bounds_are_rejected() {
        let err = parse(&["--min-delay-ms", "10", "--max-delay-ms", "5"]).unwrap_err();
        assert!(err.to_string().contains("MIN_DELAY_MS"), "{err}");
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(parse(&["--stream-buffer-size", "0"]).is_err());
        assert!(parse(&["--max-text-chars", "0"]).is_err());
    }

    #[test]
    fn prefix_normalization() {
        assert_eq!(normalize_prefix("").unwrap(), "");
        assert_eq!(normalize_prefix("/").unwrap(), "");
        assert_eq!(normalize_prefix("/api").unwrap(), "/api");
        assert_eq!(normalize_prefix("/api/").unwrap(), "/api");
        assert!(normalize_prefix("api").is_err());
        assert!(normalize_prefix("/{id}").is_err());
    }
}
