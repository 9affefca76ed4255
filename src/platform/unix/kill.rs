//! Unix process termination using SIGTERM and process-group SIGKILL

use std::os::unix::process::CommandExt;
use std::process::Command;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::Pid;

use crate::platform::KillOutcome;

/// Put the child at the head of its own process group so that
/// `kill_process_tree` reaches everything it forks.
pub fn prepare_command(cmd: &mut Command) {
    cmd.process_group(0);
}

/// Send SIGTERM to the child only.
pub fn request_graceful_stop(pid: u32) -> KillOutcome {
    match to_pid(pid) {
        Some(pid) => outcome(kill(pid, Signal::SIGTERM)),
        None => KillOutcome::Failed(Errno::EINVAL as i32),
    }
}

/// SIGKILL the whole process group led by `pid`.
pub fn kill_process_tree(pid: u32) -> KillOutcome {
    match to_pid(pid) {
        // pgid == pid, see prepare_command
        Some(pgid) => outcome(killpg(pgid, Signal::SIGKILL)),
        None => KillOutcome::Failed(Errno::EINVAL as i32),
    }
}

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().map(Pid::from_raw)
}

fn outcome(result: nix::Result<()>) -> KillOutcome {
    match result {
        Ok(()) => KillOutcome::Success,
        Err(Errno::ESRCH) => KillOutcome::AlreadyExited,
        Err(Errno::EPERM) => KillOutcome::PermissionDenied,
        Err(err) => KillOutcome::Failed(err as i32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_errno_to_outcome() {
        assert_eq!(outcome(Ok(())), KillOutcome::Success);
        assert_eq!(outcome(Err(Errno::ESRCH)), KillOutcome::AlreadyExited);
        assert_eq!(outcome(Err(Errno::EPERM)), KillOutcome::PermissionDenied);
        assert_eq!(
            outcome(Err(Errno::EINVAL)),
            KillOutcome::Failed(Errno::EINVAL as i32)
        );
    }

    #[test]
    fn rejects_out_of_range_pids() {
        assert!(matches!(
            request_graceful_stop(u32::MAX),
            KillOutcome::Failed(_)
        ));
    }
}
