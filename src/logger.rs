//! Session logger: routes `tracing` output to a single file in the OS data
//! directory.
//!
//! Each launch truncates the file, so it only holds the latest session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\layer-merge\layer-merge.log`
//!   Linux:    `~/.local/share/layer-merge/layer-merge.log`
//!   macOS:    `~/Library/Application Support/layer-merge/layer-merge.log`
//!
//! The level comes from `RUST_LOG` when set, otherwise `info` (or `debug`
//! with `verbose`).  If the file cannot be opened, output goes to stderr.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_subscriber::EnvFilter;

/// Initialise the session logger.  Must be called once before any logging;
/// later calls are ignored.
///
/// Panics are mirrored into the log before the previous hook runs.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let path = log_file_path();
    let (installed, to_file) = match open_session_file(&path) {
        Ok(file) => {
            let installed = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
            (installed, true)
        }
        Err(e) => {
            // Not fatal: fall back to stderr
            eprintln!("layer-merge: cannot open log file {}: {e}", path.display());
            let installed = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
            (installed, false)
        }
    };
    if installed.is_err() {
        // Another subscriber is already active (tests, embedding apps).
        return;
    }
    if to_file {
        tracing::debug!(path = %path.display(), "session log opened");
    }

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC: {}", info);
        prev(info);
    }));
}

/// Create the file (and its directory), truncate it and write the session
/// header.
fn open_session_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    writeln!(file, "=== layer-merge session started {} ===", human_timestamp())?;
    writeln!(file, "Log file: {}", path.display())?;
    writeln!(file)?;
    Ok(file)
}

fn log_file_path() -> PathBuf {
    data_dir().join("layer-merge").join("layer-merge.log")
}

/// Per-user data directory of the platform.
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    // Linux / fallback
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

fn human_timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => format!("(unix {})", d.as_secs()),
        Err(_) => "(unknown time)".to_string(),
    }
}
