//! Error kinds shared by the supervisor and the service installers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A child process is already being supervised
    #[error("frpc is already running")]
    AlreadyRunning,

    #[error("config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("frpc binary not found: {0}")]
    BinaryNotFound(String),

    #[error("service {0} is not installed")]
    NotInstalled(String),

    /// An external command (launchctl, systemctl, sc, docker) exited non-zero
    #[error("`{command}` failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, Error>;
