use anyhow::Context;
use bypass_relay::config::Settings;
use bypass_relay::render::render_submission;
use bypass_relay::{LinkResolver, SubmissionOutcome};
use dotenvy::dotenv;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting provider credentials
struct RedactionPatterns {
    query_key: Regex,
    bearer: Regex,
    api_key_header: Regex,
    env_keys: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            query_key: Regex::new(r"(?i)(apikey=)[^\s&]+")?,
            bearer: Regex::new(r"(?i)(bearer\s+)[A-Za-z0-9._~+/=-]+")?,
            api_key_header: Regex::new(r#"(?i)("?x-api-key"?\s*[:=]\s*"?)[^\s",}]+"#)?,
            env_keys: Regex::new(r"((?:BYPASS|TRW)_API_KEY=)[^\s&]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = self.query_key.replace_all(input, "$1[MASKED]").to_string();
        output = self.bearer.replace_all(&output, "$1[MASKED]").to_string();
        output = self
            .api_key_header
            .replace_all(&output, "$1[MASKED]")
            .to_string();
        output = self.env_keys.replace_all(&output, "$1[MASKED]").to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the original length even when redaction changed it
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Redaction must exist before the first log line
    let patterns =
        Arc::new(RedactionPatterns::new().context("Failed to compile redaction patterns")?);
    init_logging(patterns);

    info!("Starting bypass relay console...");

    let settings = init_settings();
    let resolver = LinkResolver::from_settings(&settings).await;

    for status in resolver.provider_status() {
        info!(
            provider = %status.name,
            ready = status.ready,
            has_credential = status.has_credential,
            "Provider configured"
        );
    }

    let shutdown = CancellationToken::new();
    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            ctrl_c_token.cancel();
        }
    });

    run_console(&resolver, &settings, &shutdown).await
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Settings {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            s
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

/// Read one submission per line from stdin until EOF or shutdown.
///
/// `/stats` and `/usage` print the running counters and the console user's
/// quota.
async fn run_console(
    resolver: &LinkResolver,
    settings: &Settings,
    shutdown: &CancellationToken,
) -> anyhow::Result<()> {
    let user_id = settings.console_user_id;
    let limits = resolver.limits();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => break,
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = match line {
            "/stats" => serde_json::to_string_pretty(&resolver.stats().await)?,
            "/usage" => {
                let usage = resolver.user_usage(user_id).await;
                format!(
                    "Used {}/{} today, {} remaining",
                    usage.daily_count, usage.daily_limit, usage.remaining
                )
            }
            text => {
                let outcome = resolver.handle_submission(user_id, text, shutdown).await;
                if outcome == SubmissionOutcome::Cancelled {
                    break;
                }
                render_submission(&outcome, &limits)
            }
        };
        println!("{reply}\n");
    }

    info!("Console closed");
    Ok(())
}
