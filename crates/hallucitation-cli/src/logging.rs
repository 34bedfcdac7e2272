use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// Default directives when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "hallucitation=info";

/// Log to stderr and to `<log_dir>/hallucitation.log`.
///
/// The file receives everything `RUST_LOG` (default `hallucitation=info`)
/// lets through. Stderr shares the progress bar, so it only shows warnings
/// unless `verbose` is set. Keep the returned guard alive until exit or
/// buffered file output is lost.
pub fn init(log_dir: &Path, verbose: bool, ansi: bool) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let appender = tracing_appender::rolling::never(log_dir, "hallucitation.log");
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let env_filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stderr_level = if verbose { LevelFilter::TRACE } else { LevelFilter::WARN };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .with_target(false)
                .with_filter(env_filter())
                .with_filter(stderr_level),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(env_filter()),
        )
        .try_init()?;
    Ok(guard)
}
