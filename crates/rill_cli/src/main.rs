mod logging;
mod sink;

use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use rill_core::config::OutputFormat;
use rill_core::{Event, RillConfig, StreamSession};
use rill_http::HttpTransport;
use tracing::{info, warn};

use crate::sink::FileSink;

#[derive(Parser, Debug)]
#[command(name = "rill", author, version, about, long_about = None)]
struct Args {
    /// URL to stream from (overrides the config file)
    url: Option<String>,

    /// Path to the TOML config file
    #[arg(short, long, env = "RILL_CONFIG", default_value = "rill.toml")]
    config: PathBuf,

    /// Append parsed events to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output file format
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Cancel the stream after this many seconds
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// Drop events with no text
    #[arg(long)]
    skip_empty: bool,

    /// Extra request header, e.g. -H 'Authorization: Bearer ...'
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Also write logs to a daily-rotated file in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Raw,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Raw => OutputFormat::Raw,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

fn print_event(event: &Event) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", event)?;
    stdout.flush()
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected 'Name: value', got {:?}", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in {:?}", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

impl Args {
    /// Command-line flags win over file and environment values.
    fn apply(&self, config: &mut RillConfig) {
        if let Some(url) = &self.url {
            config.http.url = Some(url.clone());
        }
        for (name, value) in &self.headers {
            config.http.headers.insert(name.clone(), value.clone());
        }
        if let Some(path) = &self.output {
            config.output.path = Some(path.clone());
        }
        if let Some(format) = self.format {
            config.output.format = format.into();
        }
        if let Some(secs) = self.duration {
            config.run.duration_secs = Some(secs);
        }
        if self.skip_empty {
            config.stream.skip_empty_events = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let _log_guard = logging::init(args.log_json, args.log_dir.as_deref())?;

    let mut config = RillConfig::load_or_default(&args.config);
    args.apply(&mut config);

    let transport = HttpTransport::from_config(&config.http)?;
    let mut sink = match &config.output.path {
        Some(path) => Some(FileSink::open(path, config.output.format)?),
        None => None,
    };

    let session = StreamSession::new(transport, &config.stream);
    info!(
        session = %session.id(),
        url = config.http.url.as_deref().unwrap_or_default(),
        "Streaming"
    );
    session.start().context("Failed to start stream")?;

    let expiry = async {
        match config.run.duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(expiry, interrupt);

    let mut seq = 0u64;
    let mut watch_interrupt = true;
    let outcome = loop {
        let pulled = tokio::select! {
            pulled = session.next() => pulled,
            _ = &mut expiry => {
                info!("Duration elapsed, cancelling stream");
                session.cancel();
                break Ok(());
            }
            signal = &mut interrupt, if watch_interrupt => {
                if let Err(e) = signal {
                    warn!("Cannot listen for Ctrl-C: {}", e);
                    watch_interrupt = false;
                    continue;
                }
                info!("Interrupted, cancelling stream");
                session.cancel();
                break Ok(());
            }
        };

        match pulled {
            Ok(Some(event)) => {
                seq += 1;
                if let Err(e) = print_event(&event) {
                    session.cancel();
                    if e.kind() == ErrorKind::BrokenPipe {
                        info!("Stdout closed, cancelling stream");
                        break Ok(());
                    }
                    return Err(e).context("Failed to write event to stdout");
                }
                if let Some(sink) = sink.as_mut() {
                    if let Err(e) = sink.append(seq, &event) {
                        warn!("Dropping event {} for {}: {:#}", seq, sink.path().display(), e);
                    }
                }
            }
            Ok(None) => break Ok(()),
            Err(e) if e.is_cancelled() => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    let stats = session.stats();
    info!(
        state = %session.state(),
        chunks = stats.chunks,
        bytes = stats.bytes,
        events = stats.events,
        "Stream finished"
    );

    outcome.context("Stream failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Authorization: Bearer abc:def").unwrap(),
            ("Authorization".to_string(), "Bearer abc:def".to_string())
        );
        assert_eq!(
            parse_header("X-Empty:").unwrap(),
            ("X-Empty".to_string(), String::new())
        );
        assert!(parse_header("no colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "rill",
            "http://localhost:8000/api/stream_test",
            "-o",
            "out.jsonl",
            "--format",
            "json",
            "--duration",
            "15",
            "--skip-empty",
            "-H",
            "X-Trace: 1",
        ]);
        let mut config = RillConfig::default();
        config.http.url = Some("http://from-file/".into());
        args.apply(&mut config);

        assert_eq!(
            config.http.url.as_deref(),
            Some("http://localhost:8000/api/stream_test")
        );
        assert_eq!(config.output.path, Some(PathBuf::from("out.jsonl")));
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.run.duration_secs, Some(15));
        assert!(config.stream.skip_empty_events);
        assert_eq!(config.http.headers.get("X-Trace").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_unset_flags_keep_config() {
        let args = Args::parse_from(["rill"]);
        let mut config = RillConfig::default();
        config.http.url = Some("http://from-file/".into());
        config.run.duration_secs = Some(3);
        args.apply(&mut config);

        assert_eq!(config.http.url.as_deref(), Some("http://from-file/"));
        assert_eq!(config.run.duration_secs, Some(3));
        assert_eq!(config.output.format, OutputFormat::Raw);
    }
}
