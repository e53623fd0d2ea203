//! User-facing build status reporting

use std::fmt;

/// Severity of a compiler log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warn => "warning",
            Self::Error => "error",
        })
    }
}

/// Receives progress and status updates while mods build.
///
/// `set_progress` is called from packaging worker threads.
pub trait BuildStatus: Send + Sync {
    /// Progress within the current step; `total` is `None` when unknown
    fn set_progress(&self, done: usize, total: Option<usize>);

    fn set_status(&self, message: &str);

    fn log_compiler_line(&self, message: &str, level: LogLevel);
}

/// Prints status lines to stdout and compiler errors to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleStatus;

impl BuildStatus for ConsoleStatus {
    fn set_progress(&self, _done: usize, _total: Option<usize>) {}

    fn set_status(&self, message: &str) {
        println!("{}", message);
    }

    fn log_compiler_line(&self, message: &str, level: LogLevel) {
        match level {
            LogLevel::Error => eprintln!("{}", message),
            _ => println!("{}", message),
        }
    }
}

/// Discards every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStatus;

impl BuildStatus for NullStatus {
    fn set_progress(&self, _done: usize, _total: Option<usize>) {}
    fn set_status(&self, _message: &str) {}
    fn log_compiler_line(&self, _message: &str, _level: LogLevel) {}
}
