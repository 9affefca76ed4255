use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Snapshot of the supervised frpc child.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub process_name: String,
    pub has_exited: bool,
    pub exit_code: Option<i32>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::Level::Trace,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of frpc output, classified by severity.
#[derive(Clone, Debug)]
pub struct LogEvent {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub stream: OutputStream,
    pub line: String,
}

#[derive(Clone, Debug)]
pub enum SupervisorEvent {
    StateChanged { running: bool, pid: Option<u32> },
    Output(LogEvent),
    Exited { pid: u32, exit_code: Option<i32> },
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServiceScope {
    #[default]
    User,
    System,
}

impl ServiceScope {
    pub const ALL: [ServiceScope; 2] = [ServiceScope::User, ServiceScope::System];
}

impl fmt::Display for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceScope::User => f.write_str("user"),
            ServiceScope::System => f.write_str("system"),
        }
    }
}

/// Everything an installer needs to register frpc with the OS service manager.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub service_name: String,
    pub binary_path: PathBuf,
    pub config_path: PathBuf,
    pub scope: ServiceScope,
    pub auto_start: bool,
    pub description: String,
}

/// Point-in-time view of a service record. Recomputed on every query.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServiceStatus {
    pub is_installed: bool,
    pub is_running: bool,
    pub is_auto_start_enabled: bool,
    pub state: String,
    pub message: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Feedback {
    pub message: String,
    pub severity: FeedbackSeverity,
}

impl Feedback {
    pub fn new(message: String, severity: FeedbackSeverity) -> Self {
        Self { message, severity }
    }

    pub fn info(message: String) -> Self {
        Self::new(message, FeedbackSeverity::Info)
    }

    pub fn warning(message: String) -> Self {
        Self::new(message, FeedbackSeverity::Warning)
    }

    pub fn error(message: String) -> Self {
        Self::new(message, FeedbackSeverity::Error)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FeedbackSeverity {
    Info,
    Warning,
    Error,
}

/// Requests typed on the console while `frpdeck run` is supervising.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConsoleCommand {
    Restart,
    Status,
    Quit,
}
