//! Ctrl-C delivery as a channel message

use std::io;
use std::thread;

use crossbeam_channel::Sender;
use nix::sys::signal::{SigSet, Signal};

/// Block SIGINT in the calling thread and forward it to `tx` from a
/// dedicated thread.
///
/// Must run before any other thread is spawned so every thread inherits
/// the blocked mask. Children inherit it as well, which is harmless for
/// frpc since it is stopped with SIGTERM.
pub fn spawn_interrupt_listener(tx: Sender<()>) -> io::Result<()> {
    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    set.thread_block().map_err(io::Error::from)?;

    thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || match set.wait() {
            Ok(signal) => {
                log::info!("Received {:?}, shutting down", signal);
                let _ = tx.send(());
            }
            Err(e) => log::error!("Waiting for SIGINT failed: {}", e),
        })?;
    Ok(())
}
