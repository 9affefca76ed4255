//! Ctrl-C delivery as a channel message

use std::io;
use std::sync::OnceLock;

use crossbeam_channel::Sender;
use windows::Win32::Foundation::BOOL;
use windows::Win32::System::Console::{CTRL_BREAK_EVENT, CTRL_C_EVENT, SetConsoleCtrlHandler};

static INTERRUPT: OnceLock<Sender<()>> = OnceLock::new();

unsafe extern "system" fn on_console_event(ctrl_type: u32) -> BOOL {
    if ctrl_type == CTRL_C_EVENT || ctrl_type == CTRL_BREAK_EVENT {
        if let Some(tx) = INTERRUPT.get() {
            let _ = tx.try_send(());
        }
        // Handled, keep the process alive so frpc gets stopped
        return BOOL::from(true);
    }
    BOOL::from(false)
}

/// Route Ctrl-C and Ctrl-Break to `tx` instead of terminating the process.
///
/// frpc runs in its own process group and never sees the console event, so
/// it is stopped through the supervisor. Only the first call installs a handler.
pub fn spawn_interrupt_listener(tx: Sender<()>) -> io::Result<()> {
    if INTERRUPT.set(tx).is_err() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "console control handler already installed",
        ));
    }
    unsafe { SetConsoleCtrlHandler(Some(on_console_event), true) }.map_err(io::Error::from)?;
    log::debug!("Console control handler installed");
    Ok(())
}
