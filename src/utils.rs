use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// Name of the frpc executable on this platform.
#[cfg(target_os = "windows")]
pub const FRPC_EXECUTABLE: &str = "frpc.exe";
#[cfg(not(target_os = "windows"))]
pub const FRPC_EXECUTABLE: &str = "frpc";

/// Build a `Command` that never flashes a console window on Windows.
#[cfg(target_os = "windows")]
pub fn hidden_command<S: AsRef<std::ffi::OsStr>>(program: S) -> Command {
    use std::os::windows::process::CommandExt;
    use windows::Win32::System::Threading::CREATE_NO_WINDOW;

    let mut cmd = Command::new(program);
    cmd.creation_flags(CREATE_NO_WINDOW.0);
    cmd
}

#[cfg(not(target_os = "windows"))]
pub fn hidden_command<S: AsRef<std::ffi::OsStr>>(program: S) -> Command {
    Command::new(program)
}

/// Resolve the frpc binary.
///
/// Order: the explicit path, a copy next to our own executable, then `PATH`.
pub fn locate_frpc(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::BinaryNotFound(format!(
            "{} does not exist",
            path.display()
        )));
    }

    if let Ok(exe) = env::current_exe()
        && let Some(dir) = exe.parent()
    {
        let sibling = dir.join(FRPC_EXECUTABLE);
        if sibling.is_file() {
            return Ok(sibling);
        }
    }

    which::which(FRPC_EXECUTABLE)
        .map_err(|e| Error::BinaryNotFound(format!("{} not on PATH: {}", FRPC_EXECUTABLE, e)))
}

/// Whether `name` resolves to an executable on `PATH`.
pub fn command_exists(name: &str) -> bool {
    which::which(name).is_ok()
}
