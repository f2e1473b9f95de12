// SPDX-License-Identifier: GPL-3.0-only

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LoggingLevel};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub const LOG_DIR_ENV: &str = "LPTOOLS_LOG_DIR";
const LOG_PREFIX: &str = "lptools.log";
const KEEP_DAYS: u64 = 7;

/// Install the global subscriber: stderr always, plus a daily file when a
/// log directory is configured. `RUST_LOG` overrides the configured level.
pub fn init(config: &Config, verbosity: u8) {
    let level = config.log_level.raised(verbosity);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let Some(dir) = log_dir(config) else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
        return;
    };

    match file_writer(&dir) {
        Ok((writer, guard)) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();

            // Keep the background logging worker alive for the duration of the process.
            let _ = LOG_GUARD.set(guard);
        }
        Err(e) => {
            eprintln!("lptools: failed to initialize file logging: {e:#}");
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
        }
    }
}

/// Our crates log at `level`; everything else stays at warn.
fn filter_for(level: LoggingLevel) -> EnvFilter {
    let directive = level.as_directive();
    EnvFilter::new(format!(
        "warn,lptools={directive},lptools_sys={directive}"
    ))
}

fn log_dir(config: &Config) -> Option<PathBuf> {
    std::env::var_os(LOG_DIR_ENV)
        .map(PathBuf::from)
        .or_else(|| config.log_dir.clone())
}

fn file_writer(dir: &Path) -> anyhow::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    if let Err(e) = fs::create_dir_all(dir) {
        return Err(anyhow::anyhow!(
            "create log directory failed: {} ({})",
            dir.display(),
            e
        ));
    }

    let prefix = OsString::from(LOG_PREFIX);
    cleanup_old_logs(dir, &prefix, SystemTime::now());

    let appender = tracing_appender::rolling::daily(dir, &prefix);
    Ok(tracing_appender::non_blocking(appender))
}

fn cleanup_old_logs(dir: &Path, prefix: &OsString, now: SystemTime) {
    let cutoff = now.checked_sub(Duration::from_secs(KEEP_DAYS * 24 * 60 * 60));
    let Some(cutoff) = cutoff else { return };

    let prefix = prefix.to_string_lossy();

    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        // Only touch files created by our rolling appender.
        if !entry
            .file_name()
            .to_string_lossy()
            .starts_with(prefix.as_ref())
        {
            continue;
        }

        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if modified >= cutoff {
            continue;
        }

        let _ = fs::remove_file(entry.path());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_keeps_dependencies_quiet() {
        let filter = filter_for(LoggingLevel::Debug).to_string();
        assert!(filter.contains("lptools=debug"));
        assert!(filter.contains("lptools_sys=debug"));
    }

    #[test]
    fn cleanup_only_removes_expired_logs() {
        let dir = std::env::temp_dir().join(format!("lptools-logs-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("create dir");
        let ours = dir.join("lptools.log.2026-01-01");
        let other = dir.join("unrelated.txt");
        fs::write(&ours, b"old").expect("write log");
        fs::write(&other, b"keep").expect("write other");

        // Pretend the files were written KEEP_DAYS + 1 days before "now".
        let later = SystemTime::now() + Duration::from_secs((KEEP_DAYS + 1) * 24 * 60 * 60);
        cleanup_old_logs(&dir, &OsString::from(LOG_PREFIX), later);

        assert!(!ours.exists());
        assert!(other.exists());
        let _ = fs::remove_dir_all(&dir);
    }
}
