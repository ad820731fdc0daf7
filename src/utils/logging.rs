//! Diagnostic logging to a file.
//!
//! The terminal is owned by the UI while chatting, so nothing may be written
//! to stdout or stderr. Events go to an append-only log file instead; when the
//! file cannot be opened logging is simply disabled.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const ENV_LOG_FILTER: &str = "THREADLINE_LOG";
pub const DEFAULT_LOG_FILE: &str = "threadline.log";
const DEFAULT_FILTER: &str = "info";

fn build_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

pub fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber. Returns the log path when file logging is
/// active.
pub fn init_tracing(path: &Path) -> Option<PathBuf> {
    let directives = std::env::var(ENV_LOG_FILTER).ok();
    let env_filter = build_filter(directives.as_deref());

    match open_log_file(path) {
        Ok(file) => {
            let installed = tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(env_filter)
                .try_init()
                .is_ok();
            if installed {
                tracing::info!(path = %path.display(), "logging initialized");
                Some(path.to_path_buf())
            } else {
                None
            }
        }
        Err(_) => {
            // Prefer no logs over corrupting the terminal UI.
            let _ = tracing_subscriber::registry().with(env_filter).try_init();
            None
        }
    }
}
