//! Subscriber setup for binaries and tests built with the `tracing` feature.

use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::StoreConfig;
use crate::error::Error;
use crate::error::Result;

/// Install a global subscriber filtered by `RUST_LOG`, writing to `log_file` or to stdout.
///
/// SQL statements logged by the store arrive through the `log` facade and show up here at `debug` level when
/// statement logging is enabled in [`StoreConfig`].
pub fn setup_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env();

    let dest_writer = Mutex::new(if let Some(log_file) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(|err| Error::Config(format!("can't open log file {}: {err}", log_file.display())))?;
        Box::new(file) as Box<dyn io::Write + Send>
    }
    else {
        Box::new(io::stdout()) as Box<dyn io::Write + Send>
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(dest_writer)
                .with_span_events(FmtSpan::CLOSE),
        )
        .try_init()
        .map_err(|err| Error::Config(err.to_string()))?;

    tracing::info!("Tracing initialized");

    Ok(())
}

pub fn setup_tracing_for(config: &StoreConfig) -> Result<()> {
    setup_tracing(config.log_file().as_deref())
}
