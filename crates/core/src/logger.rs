use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{mpsc, Mutex, OnceLock};

use chrono::Local;

static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

struct Logger {
    file: Option<File>,
    ui_tx: Option<mpsc::Sender<LogLine>>,
    prefixes: HashMap<String, u8>, // prefix -> color index
}

// Color indices for UI rendering (mapped in the controller's ui.rs)
pub const COLOR_GRAY: u8 = 1;
pub const COLOR_BLUE: u8 = 2;
pub const COLOR_GREEN: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// One log record as delivered to the controller.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub level: Level,
    pub prefix: String,
    pub color: u8,
    pub timestamp: String,
    pub message: String,
}

/// Initialize the global logger. Clears the log file.
///
/// Nothing is written before `init`; library code may log freely either way.
pub fn init(log_dir: &Path) {
    fs::create_dir_all(log_dir).ok();
    let log_path = log_dir.join("app.log");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)
        .ok();

    LOGGER
        .set(Mutex::new(Logger { file, ui_tx: None, prefixes: HashMap::new() }))
        .ok();
}

/// Wire the controller's log channel.
pub fn set_ui_sender(tx: mpsc::Sender<LogLine>) {
    if let Some(logger) = LOGGER.get() {
        let mut l = logger.lock().unwrap();
        l.ui_tx = Some(tx);
    }
}

/// Register a prefix with a color. All subsequent `*_p` calls with this
/// prefix render in that color.
pub fn register_prefix(prefix: &str, color: u8) {
    if let Some(logger) = LOGGER.get() {
        let mut l = logger.lock().unwrap();
        l.prefixes.insert(prefix.to_string(), color);
    }
}

fn write_log(level: Level, prefix: &str, msg: &str) {
    let Some(logger) = LOGGER.get() else { return };
    let Ok(mut l) = logger.lock() else { return };

    let ts = Local::now().format("%H:%M:%S").to_string();
    let color = l.prefixes.get(prefix).copied().unwrap_or(0);

    if let Some(file) = l.file.as_mut() {
        let line = if prefix.is_empty() {
            format!("[{}] [{}] {}", ts, level.as_str(), msg)
        } else {
            format!("[{}] [{}] [{}] {}", ts, level.as_str(), prefix, msg)
        };
        writeln!(file, "{}", line).ok();
    }

    if let Some(tx) = &l.ui_tx {
        tx.send(LogLine {
            level,
            prefix: prefix.to_string(),
            color,
            timestamp: ts,
            message: msg.to_string(),
        })
        .ok();
    }
}

pub fn info(msg: &str) {
    write_log(Level::Info, "", msg);
}

pub fn warn(msg: &str) {
    write_log(Level::Warn, "", msg);
}

pub fn error(msg: &str) {
    write_log(Level::Error, "", msg);
}

pub fn info_p(prefix: &str, msg: &str) {
    write_log(Level::Info, prefix, msg);
}

pub fn warn_p(prefix: &str, msg: &str) {
    write_log(Level::Warn, prefix, msg);
}

pub fn error_p(prefix: &str, msg: &str) {
    write_log(Level::Error, prefix, msg);
}
