//! Master pid persisted for external tooling (`kill $(cat daemon.pid)`).
//!
//! Every operation here is best-effort from the supervisor's point of view:
//! callers get a `Result` and decide to log it and carry on.

use nix::unistd::Pid;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

pub fn write(path: &Path, pid: Pid) -> io::Result<()> {
    fs::write(path, format!("{}\n", pid.as_raw()))
}

pub fn read(path: &Path) -> io::Result<Pid> {
    let raw = fs::read_to_string(path)?;
    raw.trim()
        .parse::<i32>()
        .map(Pid::from_raw)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn remove(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        debug!(path = %path.display(), error = %e, "Cannot remove pid file");
    }
}
