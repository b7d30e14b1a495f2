use std::io;
use std::path::Path;
use std::sync::OnceLock;
use chrono::Local;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{
    fmt::{ self },
    prelude::*,
    EnvFilter,
    filter::LevelFilter,
    util::SubscriberInitExt,
};
use tracing_appender::rolling::{ RollingFileAppender, Rotation };
use tracing_appender::non_blocking::WorkerGuard;

use crate::config::{ LogConfig, LogRotation };

// Dropping a guard stops its writer thread, so they live as long as the process
struct LogGuards {
    _file_guard: WorkerGuard,
    _console_guard: Option<WorkerGuard>,
}

static LOG_GUARDS: OnceLock<LogGuards> = OnceLock::new();

/// Initialize the logging system with non-blocking file and optional console output
pub fn init_logging(level: Level, debug: bool, log_config: &LogConfig) -> io::Result<()> {
    if !log_config.directory.exists() {
        std::fs::create_dir_all(&log_config.directory).map_err(|e| {
            eprintln!("Failed to create log directory: {}", e);
            e
        })?;
    }

    let timestamp = Local::now().format("%Y%m%d");
    let filename = format!("{}_{}.log", log_config.filename_prefix, timestamp);

    let rotation = match log_config.rotation {
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    };

    let file_appender = RollingFileAppender::new(rotation, log_config.directory.clone(), filename);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt
        ::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_span_events(FmtSpan::CLOSE);

    // RUST_LOG directives refine the configured level
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let console_guard = if debug {
        let (console_writer, console_guard) = tracing_appender::non_blocking(io::stdout());

        let console_layer = fmt
            ::layer()
            .with_writer(console_writer)
            .with_ansi(true)
            .with_target(true)
            .pretty();

        tracing_subscriber
            ::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer)
            .try_init()
            .map_err(io::Error::other)?;
        Some(console_guard)
    } else {
        tracing_subscriber::registry().with(filter).with(file_layer).try_init().map_err(io::Error::other)?;
        None
    };

    let _ = LOG_GUARDS.set(LogGuards {
        _file_guard: file_guard,
        _console_guard: console_guard,
    });

    if let Some(max_files) = log_config.max_files {
        if
            let Err(e) = cleanup_old_logs(
                &log_config.directory,
                &log_config.filename_prefix,
                max_files
            )
        {
            // Don't fail initialization if cleanup fails, just log the error
            eprintln!("Failed to clean up old log files: {}", e);
        }
    }

    tracing::info!(
        log_dir = %log_config.directory.display(),
        log_prefix = %log_config.filename_prefix,
        "Asynchronous logging initialized at level: {:?}",
        level
    );

    Ok(())
}

/// Delete the oldest log files beyond `max_files`
fn cleanup_old_logs(log_dir: &Path, prefix: &str, max_files: usize) -> io::Result<()> {
    let mut entries = std::fs
        ::read_dir(log_dir)?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let path = entry.path();
            if !path.is_file() || !path.file_name()?.to_string_lossy().starts_with(prefix) {
                return None;
            }
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((path, modified))
        })
        .collect::<Vec<_>>();

    if entries.len() <= max_files {
        return Ok(());
    }

    // newest first
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    for (path, _) in entries.iter().skip(max_files) {
        std::fs::remove_file(path)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_keeps_newest_files() {
        let dir = std::env::temp_dir().join(format!("tri-arb-logs-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..4 {
            std::fs::write(dir.join(format!("tri_arb_{}.log", i)), "x").unwrap();
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        std::fs::write(dir.join("other.log"), "x").unwrap();

        cleanup_old_logs(&dir, "tri_arb", 2).unwrap();

        let mut left: Vec<String> = std::fs
            ::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        left.sort();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(left, vec!["other.log", "tri_arb_2.log", "tri_arb_3.log"]);
    }
}
