//! Logging bootstrap
//!
//! Console output by default; a configured file path routes every line
//! through a non-blocking writer so a slow disk never stalls the scan or
//! stub workers. The JSON format is meant for production log collectors.

use std::ffi::OsStr;
use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber.
///
/// The returned guard owns the writer's flush thread; hold it for the
/// lifetime of the process or buffered lines are lost on exit.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<WorkerGuard> {
    let filter = build_filter(&config.level)?;

    let (writer, guard) = match config.file_path.as_deref() {
        Some(path) => {
            let (dir, file) = log_file_parts(Path::new(path));
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file))
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(writer))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(writer))
            .init();
    }
    Ok(guard)
}

/// `RUST_LOG` wins when present; else the configured level applies
/// process-wide.
fn build_filter(level: &str) -> anyhow::Result<EnvFilter> {
    let level: Level = level
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid log level '{level}'"))?;
    Ok(EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string())))
}

/// Split a log file path into the directory and file name the appender
/// expects.
fn log_file_parts(path: &Path) -> (&Path, &OsStr) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file = path
        .file_name()
        .unwrap_or_else(|| OsStr::new("strmsync.log"));
    (dir, file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_levels() {
        assert!(build_filter("trace").is_ok());
        assert!(build_filter("INFO").is_ok());
        assert!(build_filter("error").is_ok());
        assert!(build_filter("loud").is_err());
        assert!(build_filter("").is_err());
    }

    #[test]
    fn test_log_file_parts() {
        let (dir, file) = log_file_parts(Path::new("/var/log/strmsync/strmsync.log"));
        assert_eq!(dir, Path::new("/var/log/strmsync"));
        assert_eq!(file, "strmsync.log");

        let (dir, file) = log_file_parts(Path::new("strmsync.log"));
        assert_eq!(dir, Path::new("."));
        assert_eq!(file, "strmsync.log");
    }
}
