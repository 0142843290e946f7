//! Tracing subscriber assembly: env-filtered console logging on stderr
//! (pretty or JSON) plus an optional non-blocking rolling file appender.

use monitor_config::{Logging, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::FILE_GUARD;

/// Install the global subscriber. `RUST_LOG` wins over the config's level,
/// which wins over the CLI's `--log-level`. Stdout is left untouched so
/// `--json` record streams stay machine-parseable.
pub fn init_tracing(json: bool, cli_level: &str, logging: &Logging) {
    let default_level = logging.level.as_deref().unwrap_or(cli_level);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console = if json || logging.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    let file_layer = logging.dir.as_deref().map(|dir| {
        let appender = match logging.rotation {
            Rotation::Never => tracing_appender::rolling::never(dir, "monitor.log"),
            Rotation::Daily => tracing_appender::rolling::daily(dir, "monitor.log"),
            Rotation::Hourly => tracing_appender::rolling::hourly(dir, "monitor.log"),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(writer)
            .boxed()
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init();
}
