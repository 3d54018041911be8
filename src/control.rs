//! Signals reaching the master, turned into a queue of [`Event`]s.
//!
//! The OS handler only writes the signal number into a socket pair; the
//! master reads it back on its own thread, one event at a time, so two
//! handlers never run over each other.

use nix::sys::signal::Signal;
use signal_hook::consts::{SIGCHLD, SIGINT, SIGTERM};
use signal_hook::low_level;
use signal_hook::SigId;
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use tracing::{debug, warn};

/// Signals the master subscribes to.
pub const MASTER_SIGNALS: [i32; 3] = [SIGTERM, SIGINT, SIGCHLD];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// At least one child changed state; several exits may be folded into one.
    ChildExited,
    /// SIGTERM or SIGINT.
    Terminate(Signal),
}

impl Event {
    pub fn from_signal(signo: i32) -> Option<Event> {
        match Signal::try_from(signo).ok()? {
            Signal::SIGCHLD => Some(Event::ChildExited),
            sig @ (Signal::SIGTERM | Signal::SIGINT) => Some(Event::Terminate(sig)),
            _ => None,
        }
    }
}

/// The master's subscription to [`MASTER_SIGNALS`].
///
/// Dropping it unregisters the actions of this process only; the socket
/// pair closes with it.
pub struct SignalEvents {
    reader: UnixStream,
    ids: Vec<SigId>,
}

impl SignalEvents {
    pub fn register() -> io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        writer.set_nonblocking(true)?;
        let writer = Arc::new(writer);

        let mut events = SignalEvents { reader, ids: Vec::with_capacity(MASTER_SIGNALS.len()) };
        for signo in MASTER_SIGNALS {
            let writer = Arc::clone(&writer);
            let byte = signo as u8;
            // SAFETY: the action is a single non-blocking write(2), which is async-signal-safe.
            // A full buffer drops the byte; SIGCHLD handling drains every child anyway.
            let id = unsafe {
                low_level::register(signo, move || {
                    let _ = (&*writer).write(&[byte]);
                })
            }?;
            events.ids.push(id);
        }
        Ok(events)
    }

    /// Blocks until the next master signal arrives. `None` once the queue is broken.
    pub fn next_event(&mut self) -> Option<Event> {
        let mut buf = [0u8; 1];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return None,
                Ok(_) => match Event::from_signal(i32::from(buf[0])) {
                    Some(event) => return Some(event),
                    None => debug!(signo = buf[0], "Ignoring unexpected signal"),
                },
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Signal queue read failed");
                    return None;
                }
            }
        }
    }
}

impl Drop for SignalEvents {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            low_level::unregister(id);
        }
    }
}

/// Forgets the master's subscription inside a freshly forked worker.
///
/// Unregistering touches only the worker's copy of the registry, and the
/// worker's ends of the socket pair are closed without a write, so the
/// master's queue never hears from a worker. As in the master's own handlers,
/// which are no-ops outside the master, the worker keeps signal-hook's handler
/// for SIGTERM/SIGINT/SIGCHLD installed: those signals reach only listeners
/// the worker body registers itself and are otherwise swallowed. SIGQUIT keeps
/// its default action and is what the master uses to stop workers.
pub fn release_in_worker(events: Option<SignalEvents>) {
    drop(events);
}
