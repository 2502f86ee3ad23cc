use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "warn";

/// Send diagnostics to `log_path` so the REPL output stays clean.
///
/// The filter comes from `HEARTH_LOG`, then `RUST_LOG`, then `warn`.
pub fn init_tracing(log_path: &Path) -> io::Result<()> {
    let filter = ["HEARTH_LOG", "RUST_LOG"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    if let Some(dir) = log_path.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::Layer::new()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true),
        )
        .with(filter);

    // A subscriber may already be installed (tests, embedding); keep it.
    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        tracing::debug!(path = %log_path.display(), "Tracing initialized");
    }
    Ok(())
}
