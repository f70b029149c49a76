//! Terminal status lines for monoserve.
//!
//! ```text
//! [action] message
//! ```
//!
//! Output goes to stderr so stdout stays free for generated code. Set
//! `LOG_LEVEL` to `error`, `info` (default) or `debug`.

use std::env;
use std::sync::OnceLock;

const BRAND: &str = "\x1b[38;5;208m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum LogLevel {
    Error = 0,
    Info = 1,
    Debug = 2,
}

impl LogLevel {
    fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "debug" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }
}

static LOG_LEVEL: OnceLock<LogLevel> = OnceLock::new();

fn emit_line(line: &str) {
    eprintln!("{}", line);
}

/// Current level, read once from `LOG_LEVEL`.
pub fn log_level() -> LogLevel {
    *LOG_LEVEL.get_or_init(|| {
        env::var("LOG_LEVEL")
            .map(|s| LogLevel::parse(&s))
            .unwrap_or(LogLevel::Info)
    })
}

pub fn is_debug() -> bool {
    log_level() >= LogLevel::Debug
}

/// `[action] message`, shown at info and above.
pub fn log(action: &str, message: &str) {
    if log_level() >= LogLevel::Info {
        emit_line(&format_line(action, message));
    }
}

/// `[action] message`, always shown.
pub fn error(action: &str, message: &str) {
    emit_line(&format_line(action, message));
}

/// `[warn] [name] message`
pub fn warn(name: &str, message: &str) {
    emit_line(&format!("[warn] {}", format_line(name, message)));
}

/// `[ok] message`
pub fn success(message: &str) {
    if log_level() >= LogLevel::Info {
        emit_line(&format!("[ok] {}", message));
    }
}

/// `[fail] message`
pub fn fail(message: &str) {
    emit_line(&format!("[fail] {}", message));
}

/// Aligned `label value` line.
pub fn info(label: &str, value: &str) {
    if log_level() >= LogLevel::Info {
        emit_line(&format!("  {:<10} {}", label, value));
    }
}

/// Indented `-> message` under the previous line.
pub fn detail(message: &str) {
    emit_line(&format!("    -> {}", message));
}

/// Only shown when `LOG_LEVEL=debug`.
pub fn debug(action: &str, message: &str) {
    if is_debug() {
        emit_line(&format_line(action, message));
    }
}

/// Startup banner: product name and version.
pub fn banner(version: &str) {
    if log_level() >= LogLevel::Info {
        emit_line("");
        emit_line(&format!("  {}{}monoserve{} v{}", BOLD, BRAND, RESET, version));
        emit_line("");
    }
}

fn format_line(action: &str, message: &str) -> String {
    format!("[{}] {}", action, message)
}
