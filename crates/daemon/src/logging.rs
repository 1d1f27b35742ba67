//! Logging setup
//!
//! Console output is `pretty` for development or `json` for production.
//! With a log directory configured, JSON lines also go to a daily-rotated file.

use crate::settings::LogSettings;
use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "auditdesk=info";
const LOG_FILE_PREFIX: &str = "auditdesk.log";

/// Install the global subscriber.
///
/// The returned guard flushes the file writer and must live until exit.
pub fn init_logging(settings: &LogSettings) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Failed to create env filter")?;

    let (file_layer, guard) = match &settings.directory {
        Some(directory) => {
            let directory = shellexpand::tilde(directory).into_owned();
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    match settings.format.as_str() {
        "json" => registry.with(fmt::layer().json()).try_init(),
        _ => registry.with(fmt::layer().pretty()).try_init(),
    }
    .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
