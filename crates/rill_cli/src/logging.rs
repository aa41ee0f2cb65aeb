use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Console output goes to stderr so stdout
/// only carries events.
///
/// With `log_dir`, logs are also written to a daily-rotated `rill.log` there;
/// keep the returned guard alive until exit or buffered lines are lost.
pub fn init(json: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "rill.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .context("Failed to install JSON log subscriber")?;
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .context("Failed to install log subscriber")?;
    }

    Ok(guard)
}
