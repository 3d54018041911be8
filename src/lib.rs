/* src/lib.rs */

#[cfg(not(unix))]
compile_error!("daemon needs fork(2) and POSIX signals; only Unix targets are supported");

// Re-export modules for both binary and tests
pub mod control;
pub mod error;
pub mod lock;
pub mod logger;
pub mod parse;
pub mod pidfile;
mod registry;
pub mod runtime;
pub mod supervisor;

pub use control::Event;
pub use error::{ConfigError, DaemonError, LockError, LogError, PrivilegeError, SpawnError};
pub use lock::LockGuard;
pub use parse::{parser, DaemonConfig, LogConfig};
pub use runtime::{ForkSpawner, Reaped, WorkerContext, WorkerExit, WorkerHandle, WorkerSpawner};
pub use supervisor::{Flow, State, Supervisor};
