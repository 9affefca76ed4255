//! Windows process termination using taskkill

use std::os::windows::process::CommandExt;
use std::process::Command;

use windows::Win32::System::Threading::{CREATE_NEW_PROCESS_GROUP, CREATE_NO_WINDOW};

use crate::platform::KillOutcome;
use crate::utils::hidden_command;

/// Detach the child from our console and give it its own process group.
pub fn prepare_command(cmd: &mut Command) {
    cmd.creation_flags(CREATE_NO_WINDOW.0 | CREATE_NEW_PROCESS_GROUP.0);
}

/// Ask the process tree to close. Console programs usually ignore this.
pub fn request_graceful_stop(pid: u32) -> KillOutcome {
    taskkill(pid, false)
}

pub fn kill_process_tree(pid: u32) -> KillOutcome {
    taskkill(pid, true)
}

fn taskkill(pid: u32, force: bool) -> KillOutcome {
    let pid_arg = pid.to_string();
    let mut cmd = hidden_command("taskkill");
    cmd.args(["/PID", pid_arg.as_str(), "/T"]);
    if force {
        cmd.arg("/F");
    }

    match cmd.output() {
        Ok(out) if out.status.success() => KillOutcome::Success,
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let stdout = String::from_utf8_lossy(&out.stdout);
            let output = if stderr.is_empty() { stdout } else { stderr };

            if output.contains("not found") {
                KillOutcome::AlreadyExited
            } else if output.contains("Access is denied") {
                KillOutcome::PermissionDenied
            } else {
                log::debug!("taskkill for PID {} said: {}", pid, output.trim());
                KillOutcome::Failed(out.status.code().unwrap_or(-1))
            }
        }
        Err(e) => KillOutcome::Failed(e.raw_os_error().unwrap_or(-1)),
    }
}
