//! Session logger. Writes all `log` output to a single file in the OS data
//! directory, mirrored to stderr for warnings and errors.
//!
//! The file is **truncated (overwritten) at each launch**, so it only ever
//! contains output from the most-recent session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\tilecanvas\tilecanvas.log`
//!   Linux:    `~/.local/share/tilecanvas/tilecanvas.log`
//!   macOS:    `~/Library/Application Support/tilecanvas/tilecanvas.log`
//!
//! Library code only ever uses the `log` macros; installing this logger is
//! up to the binary.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{LevelFilter, Log, Metadata, Record};

static LOGGER: OnceLock<SessionLogger> = OnceLock::new();

struct SessionLogger {
    file: Option<Mutex<File>>,
    path: Option<PathBuf>,
    level: LevelFilter,
}

impl SessionLogger {
    fn write_line(&self, line: &str) {
        if let Some(mutex) = &self.file
            && let Ok(mut file) = mutex.lock()
        {
            let _ = writeln!(file, "{}", line);
        }
    }
}

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{}] [{}] {}", timestamp(), record.level(), record.args());
        if record.level() <= log::Level::Warn || self.file.is_none() {
            eprintln!("{}", line);
        }
        self.write_line(&line);
    }

    fn flush(&self) {
        if let Some(mutex) = &self.file
            && let Ok(mut file) = mutex.lock()
        {
            let _ = file.flush();
        }
    }
}

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOGGER.get().and_then(|l| l.path.as_ref())
}

/// Initialise the session logger. Later calls are ignored.
///
/// * Creates (or truncates) the log file. If that fails, logging goes to stderr only.
/// * Installs a panic hook that writes the panic message to the log before
///   propagating to the default handler.
pub fn init(level: LevelFilter) {
    let path = log_file_path();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = match OpenOptions::new().create(true).write(true).truncate(true).open(&path) {
        Ok(f) => Some(f),
        Err(e) => {
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            None
        }
    };
    let logger = SessionLogger {
        path: file.as_ref().map(|_| path.clone()),
        file: file.map(Mutex::new),
        level,
    };

    if LOGGER.set(logger).is_err() {
        return;
    }
    let Some(logger) = LOGGER.get() else { return };
    if log::set_logger(logger).is_err() {
        // Someone else already installed a logger; leave it alone.
        return;
    }
    log::set_max_level(level);

    logger.write_line(&format!("=== tilecanvas session started {} ===", human_timestamp()));
    if let Some(p) = &logger.path {
        logger.write_line(&format!("Log file: {}", p.display()));
    }
    logger.write_line("");

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Some(logger) = LOGGER.get() {
            logger.write_line(&format!("[{}] [PANIC] {}", timestamp(), info));
        }
        prev(info);
    }));
}

fn log_file_path() -> PathBuf {
    data_dir().join("tilecanvas").join("tilecanvas.log")
}

/// Platform data directory (without the app sub-folder).
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

/// HH:MM:SS within the current UTC day.
fn timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => {
            let secs = d.as_secs();
            format!("{:02}:{:02}:{:02}", (secs % 86400) / 3600, (secs % 3600) / 60, secs % 60)
        }
        Err(_) => "??:??:??".to_string(),
    }
}

fn human_timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => format!("(unix {})", d.as_secs()),
        Err(_) => "(unknown time)".to_string(),
    }
}
