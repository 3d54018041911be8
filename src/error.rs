use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to take the single-instance lock.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("the lock file {} has been taken by another process, maybe another daemon is running", path.display())]
    AlreadyHeld { path: PathBuf },

    #[error("failed to open lock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The process-creation primitive refused to create a worker.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("fork failed: {0}")]
    Fork(#[from] nix::Error),
}

/// Worker-side uid/gid switch failures.
#[derive(Debug, Error)]
pub enum PrivilegeError {
    #[error("unknown user `{0}`")]
    UnknownUser(String),

    #[error("unknown group `{0}`")]
    UnknownGroup(String),

    #[error("failed to look up `{name}`: {source}")]
    Lookup {
        name: String,
        #[source]
        source: nix::Error,
    },

    #[error("setuid to `{user}` failed: {source}")]
    SetUid {
        user: String,
        #[source]
        source: nix::Error,
    },

    #[error("setgid to `{group}` failed: {source}")]
    SetGid {
        group: String,
        #[source]
        source: nix::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("unknown log level `{0}`")]
    Level(String),

    #[error(transparent)]
    Appender(#[from] tracing_appender::rolling::InitError),

    #[error(transparent)]
    Install(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Errors that stop the master before or while it starts.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("no worker entry registered, call on_worker_start before starting")]
    MissingWorkerStart,

    #[error("supervisor has already been started")]
    AlreadyStarted,

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("failed to detach from the controlling terminal: {0}")]
    Daemonize(#[source] nix::Error),

    #[error("failed to register signal handlers: {0}")]
    Signals(#[source] io::Error),
}
