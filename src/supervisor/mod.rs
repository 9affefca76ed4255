//! Supervision of a single frpc child process.
//!
//! The supervisor owns at most one child. `start`, `stop` and `restart`
//! serialize on one mutex, so overlapping calls from several threads never
//! race on the child. Output lines and state changes are delivered over a
//! crossbeam channel handed out by [`Supervisor::new`].

mod output;

pub use output::classify_line;

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::model::{OutputStream, ProcessHandle, SupervisorEvent};
use crate::platform::KillOutcome;
use crate::platform::current::kill::{kill_process_tree, prepare_command, request_graceful_stop};
use crate::utils::locate_frpc;

/// How long a graceful stop may take before the process tree is killed.
pub const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(5);
/// Pause between stop and start on restart, so the old session's sockets are released.
pub const RESTART_DELAY: Duration = Duration::from_millis(500);

const FORCE_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_STEP: Duration = Duration::from_millis(100);
/// Readers still blocked after this are detached instead of joined.
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);
const READER_POLL_STEP: Duration = Duration::from_millis(10);

struct Session {
    child: Child,
    handle: ProcessHandle,
    cancel: Arc<AtomicBool>,
    readers: Vec<JoinHandle<()>>,
}

impl Session {
    /// Kill whatever is left in the child's process group, then join the
    /// readers. A reader whose pipe is still held open elsewhere is detached
    /// once [`READER_JOIN_TIMEOUT`] passes.
    fn release(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        match kill_process_tree(self.handle.pid) {
            KillOutcome::Success => debug!(
                "Killed leftover processes of frpc (PID {})",
                self.handle.pid
            ),
            KillOutcome::AlreadyExited => {}
            outcome => debug!(
                "Could not clear process group of PID {}: {:?}",
                self.handle.pid, outcome
            ),
        }

        let deadline = Instant::now() + READER_JOIN_TIMEOUT;
        for reader in self.readers.drain(..) {
            while !reader.is_finished() && Instant::now() < deadline {
                thread::sleep(READER_POLL_STEP);
            }
            if !reader.is_finished() {
                warn!("frpc output reader still blocked, detaching it");
                continue;
            }
            if reader.join().is_err() {
                warn!("frpc output reader panicked");
            }
        }
    }
}

pub struct Supervisor {
    binary: Option<PathBuf>,
    session: Mutex<Option<Session>>,
    events: Sender<SupervisorEvent>,
}

impl Supervisor {
    /// Create a supervisor. `binary` pins the frpc executable; when `None`
    /// it is located on every start.
    pub fn new(binary: Option<PathBuf>) -> (Self, Receiver<SupervisorEvent>) {
        let (events, rx) = crossbeam_channel::unbounded();
        let supervisor = Self {
            binary,
            session: Mutex::new(None),
            events,
        };
        (supervisor, rx)
    }

    pub fn start(&self, config_path: &Path) -> Result<ProcessHandle> {
        let mut guard = self.lock();
        self.start_locked(&mut guard, config_path)
    }

    pub fn stop(&self) -> Result<()> {
        let mut guard = self.lock();
        self.stop_locked(&mut guard)
    }

    /// Stop, wait [`RESTART_DELAY`], start again. The lock is held throughout,
    /// so the next start can never overlap the previous child. Nothing is
    /// started if the old child could not be stopped.
    pub fn restart(&self, config_path: &Path) -> Result<ProcessHandle> {
        let mut guard = self.lock();
        self.stop_locked(&mut guard).inspect_err(|e| {
            error!("Not restarting frpc, the old process could not be stopped: {}", e);
        })?;
        thread::sleep(RESTART_DELAY);
        self.start_locked(&mut guard, config_path)
    }

    /// Current handle, or `None` when nothing is supervised.
    ///
    /// If the child exited since the last call, the returned handle carries
    /// the exit code and the session is released.
    pub fn poll(&self) -> Option<ProcessHandle> {
        let mut guard = self.lock();
        let handle = guard.as_ref().map(|s| s.handle.clone())?;
        match self.reap_locked(&mut guard) {
            Some(exited) => Some(exited),
            None => Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.poll().is_some_and(|handle| !handle.has_exited)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SupervisorEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    /// Release the session if its child has exited, returning the final handle.
    fn reap_locked(&self, guard: &mut MutexGuard<'_, Option<Session>>) -> Option<ProcessHandle> {
        let session = guard.as_mut()?;
        let status = match session.child.try_wait() {
            Ok(Some(status)) => status,
            Ok(None) => return None,
            Err(e) => {
                warn!(
                    "Failed to query frpc (PID {}) status: {}",
                    session.handle.pid, e
                );
                return None;
            }
        };

        let mut session = guard.take()?;
        session.release();
        session.handle.has_exited = true;
        session.handle.exit_code = status.code();
        warn!(
            "frpc (PID {}) exited unexpectedly with {}",
            session.handle.pid, status
        );
        self.emit(SupervisorEvent::Exited {
            pid: session.handle.pid,
            exit_code: session.handle.exit_code,
        });
        self.emit(SupervisorEvent::StateChanged {
            running: false,
            pid: None,
        });
        Some(session.handle)
    }

    fn start_locked(
        &self,
        guard: &mut MutexGuard<'_, Option<Session>>,
        config_path: &Path,
    ) -> Result<ProcessHandle> {
        self.reap_locked(guard);
        if let Some(session) = guard.as_ref() {
            warn!("frpc is already running (PID {})", session.handle.pid);
            return Err(Error::AlreadyRunning);
        }

        if !config_path.is_file() {
            warn!("frpc config file not found: {}", config_path.display());
            return Err(Error::ConfigNotFound(config_path.to_path_buf()));
        }

        let binary = locate_frpc(self.binary.as_deref()).inspect_err(|e| warn!("{}", e))?;

        let mut cmd = Command::new(&binary);
        cmd.arg("-c")
            .arg(config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        prepare_command(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn {}: {}", binary.display(), e);
            Error::Spawn(e)
        })?;
        let pid = child.id();

        let cancel = Arc::new(AtomicBool::new(false));
        let readers = match self.spawn_readers(&mut child, &cancel) {
            Ok(readers) => readers,
            Err(e) => {
                error!("Failed to start frpc output readers: {}", e);
                cancel.store(true, Ordering::SeqCst);
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Io(e));
            }
        };

        let handle = ProcessHandle {
            pid,
            process_name: binary
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "frpc".to_string()),
            has_exited: false,
            exit_code: None,
        };
        info!(
            "Started {} (PID {}) with {}",
            binary.display(),
            pid,
            config_path.display()
        );

        **guard = Some(Session {
            child,
            handle: handle.clone(),
            cancel,
            readers,
        });
        self.emit(SupervisorEvent::StateChanged {
            running: true,
            pid: Some(pid),
        });
        Ok(handle)
    }

    fn spawn_readers(
        &self,
        child: &mut Child,
        cancel: &Arc<AtomicBool>,
    ) -> std::io::Result<Vec<JoinHandle<()>>> {
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(output::spawn_reader(
                stdout,
                OutputStream::Stdout,
                self.events.clone(),
                cancel.clone(),
            )?);
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(output::spawn_reader(
                stderr,
                OutputStream::Stderr,
                self.events.clone(),
                cancel.clone(),
            )?);
        }
        Ok(readers)
    }

    fn stop_locked(&self, guard: &mut MutexGuard<'_, Option<Session>>) -> Result<()> {
        self.reap_locked(guard);
        let Some(mut session) = guard.take() else {
            warn!("Stop requested but frpc is not running");
            return Ok(());
        };

        let pid = session.handle.pid;
        session.cancel.store(true, Ordering::SeqCst);
        info!("Stopping frpc (PID {})", pid);

        let result = terminate(&mut session.child, pid);
        self.finish_stop(guard, session, result)
    }

    /// Report the outcome of a stop. A child that survived termination goes
    /// back into the session so it is neither orphaned nor replaced; a later
    /// stop or poll picks it up again.
    fn finish_stop(
        &self,
        guard: &mut MutexGuard<'_, Option<Session>>,
        mut session: Session,
        result: Result<ExitStatus>,
    ) -> Result<()> {
        let pid = session.handle.pid;
        let outcome = match result {
            Ok(status) => {
                session.release();
                info!("frpc (PID {}) stopped with {}", pid, status);
                self.emit(SupervisorEvent::Exited {
                    pid,
                    exit_code: status.code(),
                });
                Ok(())
            }
            Err(e) => {
                error!("Failed to stop frpc (PID {}): {}", pid, e);
                **guard = Some(session);
                Err(e)
            }
        };
        self.emit(SupervisorEvent::StateChanged {
            running: false,
            pid: None,
        });
        outcome
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        let mut guard = self.lock();
        if guard.is_some() {
            debug!("Supervisor dropped with a live child, stopping it");
            let _ = self.stop_locked(&mut guard);
        }
    }
}

/// Graceful stop, then kill the process tree once [`GRACEFUL_STOP_TIMEOUT`] passes.
fn terminate(child: &mut Child, pid: u32) -> Result<ExitStatus> {
    match request_graceful_stop(pid) {
        KillOutcome::Success | KillOutcome::AlreadyExited => {}
        outcome => warn!("Graceful stop of frpc (PID {}) failed: {:?}", pid, outcome),
    }
    if let Some(status) = wait_for_exit(child, GRACEFUL_STOP_TIMEOUT)? {
        return Ok(status);
    }

    warn!(
        "frpc (PID {}) still running after {:?}, killing process tree",
        pid, GRACEFUL_STOP_TIMEOUT
    );
    match kill_process_tree(pid) {
        KillOutcome::Success | KillOutcome::AlreadyExited => {}
        outcome => {
            warn!("Killing frpc process tree (PID {}) failed: {:?}", pid, outcome);
            // Last resort, reaches the direct child only
            if let Err(e) = child.kill() {
                debug!("Child::kill for PID {} failed: {}", pid, e);
            }
        }
    }

    match wait_for_exit(child, FORCE_TIMEOUT)? {
        Some(status) => Ok(status),
        None => Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("frpc (PID {}) did not exit after being killed", pid),
        ))),
    }
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_STEP);
    }
}
