//! Line readers for the child's stdout/stderr and severity classification.

use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use chrono::Local;
use crossbeam_channel::Sender;

use crate::model::{LogEvent, LogLevel, OutputStream, SupervisorEvent};

/// Infer a severity from the text of one output line.
///
/// Case-insensitive substring match, checked in order of severity; lines
/// with no keyword are informational.
pub fn classify_line(line: &str) -> LogLevel {
    let lc = line.to_lowercase();
    if lc.contains("error") || lc.contains("err") {
        LogLevel::Error
    } else if lc.contains("warn") {
        LogLevel::Warn
    } else if lc.contains("info") {
        LogLevel::Info
    } else if lc.contains("debug") {
        LogLevel::Debug
    } else if lc.contains("trace") {
        LogLevel::Trace
    } else {
        LogLevel::Info
    }
}

impl LogEvent {
    pub fn classify(stream: OutputStream, line: String) -> Self {
        Self {
            timestamp: Local::now(),
            level: classify_line(&line),
            stream,
            line,
        }
    }
}

/// Spawn a thread forwarding each line of `source` as an output event.
///
/// The thread ends at EOF, on a read error, once `cancel` is set, or when
/// nobody listens for events anymore.
pub(crate) fn spawn_reader<R>(
    source: R,
    stream: OutputStream,
    events: Sender<SupervisorEvent>,
    cancel: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let name = match stream {
        OutputStream::Stdout => "frpc-stdout",
        OutputStream::Stderr => "frpc-stderr",
    };
    thread::Builder::new().name(name.to_string()).spawn(move || {
        let mut reader = BufReader::new(source);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    log::debug!("{} reader stopped: {}", name, e);
                    break;
                }
            }
            if cancel.load(Ordering::SeqCst) {
                break;
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }

            let event = LogEvent::classify(stream, line.to_string());
            log::log!(target: "frpc", log::Level::from(event.level), "{}", event.line);
            if events.send(SupervisorEvent::Output(event)).is_err() {
                break;
            }
        }
        log::trace!("{} reader finished", name);
    })
}
