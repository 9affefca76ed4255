use std::io;

use crate::error::Error;
use crate::utils::hidden_command;

/// Captured result of an external command.
#[derive(Clone, Debug, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Seam between the installers and the OS service-manager CLIs.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput>;
}

/// Runs commands for real, without a console window on Windows.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        log::debug!("Running {} {}", program, args.join(" "));
        let out = hidden_command(program).args(args).output()?;
        Ok(CommandOutput {
            code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

/// Run a command and turn a spawn failure or non-zero exit into an error.
pub fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
) -> crate::Result<CommandOutput> {
    let command = format!("{} {}", program, args.join(" "));
    let out = runner.run(program, args).map_err(|e| {
        log::error!("Failed to run `{}`: {}", command, e);
        Error::Io(e)
    })?;
    if out.success() {
        return Ok(out);
    }

    // sc.exe reports failures on stdout
    let stderr = if out.stderr.trim().is_empty() {
        out.stdout.trim().to_string()
    } else {
        out.stderr.trim().to_string()
    };
    log::error!("`{}` exited with {:?}: {}", command, out.code, stderr);
    Err(Error::CommandFailed {
        command,
        code: out.code,
        stderr,
    })
}

/// Run a command for its answer; spawn failures count as no answer.
pub fn try_run(runner: &dyn CommandRunner, program: &str, args: &[&str]) -> Option<CommandOutput> {
    match runner.run(program, args) {
        Ok(out) => Some(out),
        Err(e) => {
            log::debug!("`{} {}` could not run: {}", program, args.join(" "), e);
            None
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{FakeRunner, fail, ok};
    use super::*;

    #[test]
    fn checked_run_reports_stderr_or_stdout() {
        let runner = FakeRunner::new()
            .respond("systemctl", |_| fail(5, "Unit frpc.service not found."))
            .respond("sc", |_| CommandOutput {
                code: Some(1060),
                stdout: "[SC] OpenService FAILED 1060:\n".into(),
                stderr: String::new(),
            });

        match run_checked(&runner, "systemctl", &["start", "frpc"]) {
            Err(Error::CommandFailed { command, code, stderr }) => {
                assert_eq!(command, "systemctl start frpc");
                assert_eq!(code, Some(5));
                assert_eq!(stderr, "Unit frpc.service not found.");
            }
            other => panic!("unexpected {:?}", other),
        }
        match run_checked(&runner, "sc", &["query", "frpc"]) {
            Err(Error::CommandFailed { stderr, .. }) => {
                assert!(stderr.contains("OpenService FAILED"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_program_is_io_error() {
        let runner = FakeRunner::new().respond("launchctl", |_| ok(""));
        assert!(matches!(
            run_checked(&runner, "systemctl", &["daemon-reload"]),
            Err(Error::Io(_))
        ));
        assert!(try_run(&runner, "systemctl", &["is-active", "frpc"]).is_none());
        assert!(run_checked(&runner, "launchctl", &["list"]).is_ok());
    }
}
