//! Usage: Tracing initialization (stdout + daily file logs) and old-log pruning.

use crate::infra::app_paths;
use crate::infra::settings;
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "campus-hub.log";

/// Initialize the global subscriber. The returned guard must be held for the
/// process lifetime or buffered file output is lost.
pub fn init(extra_directives: &[String]) -> Option<WorkerGuard> {
    // Bridge `log` records (reqwest, rusqlite, ...) into tracing.
    let _ = tracing_log::LogTracer::init();

    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    for raw in extra_directives {
        match raw.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(err) => eprintln!("ignoring invalid log directive {raw:?}: {err}"),
        }
    }

    let (file_layer, guard) = match app_paths::log_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        Err(err) => {
            eprintln!("file logging disabled, failed to resolve log dir: {err}");
            (None, None)
        }
    };

    let init_result = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init();
    if init_result.is_err() {
        // Already initialized (tests, repeated init); keep the existing subscriber.
        return guard;
    }

    prune_old_logs();

    guard
}

/// Install a global panic hook so panics land in the disk logs for post-mortem
/// diagnosis. The payload is intentionally NOT logged to avoid leaking user
/// data.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        tracing::error!(
            location = %location,
            "PANIC: application panicked at {location}. Check the log file for context leading up to this panic."
        );
    }));
}

fn prune_old_logs() {
    let retention_days = settings::log_retention_days_fail_open();
    let Ok(dir) = app_paths::log_dir() else {
        return;
    };
    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60));
    let Some(cutoff) = cutoff else {
        return;
    };

    let Ok(entries) = std::fs::read_dir(&dir) else {
        return;
    };
    let mut removed = 0usize;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_log_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
        if !is_log_file {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if modified < cutoff && std::fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }
    if removed > 0 {
        tracing::info!(removed, retention_days, "pruned old log files");
    }
}
