use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open log file: {0}")]
    LogFile(#[from] io::Error),
    #[error("global subscriber already set: {0}")]
    Init(#[from] TryInitError),
}

/// Verbosity from `RUST_LOG`, falling back to `"info"` when unset or invalid.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs a global `tracing` subscriber writing to stdout.
///
/// Embedding applications that bring their own subscriber skip this; the
/// library only emits events.
pub fn setup_stdout() -> Result<(), Error> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(true))
        .with(env_filter())
        .try_init()?;
    tracing::debug!("logging initialized with stdout output");
    Ok(())
}

/// Installs a global `tracing` subscriber appending to the file at `log_path`.
pub fn setup_log_file(log_path: &Path) -> Result<(), Error> {
    let file = OpenOptions::new().create(true).append(true).open(log_path)?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(env_filter())
        .try_init()?;
    tracing::debug!(path = %log_path.display(), "logging initialized with file output");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_subscriber_is_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log_path = dir.path().join("nft-verdict.log");

        // only one global subscriber per process, whichever test got there first
        let first = setup_log_file(&log_path);
        let second = setup_stdout();
        assert!(first.is_err() || matches!(second, Err(Error::Init(_))));
        assert!(log_path.exists());
        Ok(())
    }

    #[test]
    fn test_unwritable_log_file() {
        let res = setup_log_file(Path::new("/nonexistent-dir/nft-verdict.log"));
        assert!(matches!(res, Err(Error::LogFile(_))));
    }
}
