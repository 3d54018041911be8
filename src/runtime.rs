use crate::error::{PrivilegeError, SpawnError};
use crate::parse::DaemonConfig;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, getpid, setgid, setsid, setuid, ForkResult, Group, Pid, User};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info, trace};

/// Body of every worker, invoked once inside the child process.
pub type WorkerFn = Box<dyn FnMut(&WorkerHandle)>;

/// Exit code of a worker whose callback panicked or that could not drop privileges.
pub const EXIT_WORKER_FAILURE: i32 = 1;

/// A worker process as seen from either side of the fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerHandle {
    pid: Pid,
}

impl WorkerHandle {
    pub fn new(pid: Pid) -> Self {
        WorkerHandle { pid }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn signal(&self, sig: Signal) -> nix::Result<()> {
        kill(self.pid, sig)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Exited(i32),
    Signaled(Signal),
}

/// One child collected by a non-blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaped {
    pub pid: Pid,
    pub exit: WorkerExit,
}

/// Process creation, reaping and signalling as needed by the master.
///
/// `spawn` runs `entry` as the whole life of a new process and hands the
/// parent a handle for it; the child exits with the code `entry` returns.
pub trait WorkerSpawner {
    fn spawn(&mut self, entry: &mut dyn FnMut(WorkerHandle) -> i32) -> Result<WorkerHandle, SpawnError>;

    /// Collects one exited child, `None` when nothing is waitable right now.
    fn try_reap(&mut self) -> nix::Result<Option<Reaped>>;

    fn kill(&mut self, worker: &WorkerHandle, sig: Signal) -> nix::Result<()>;
}

/// [`WorkerSpawner`] backed by fork(2) and waitpid(2).
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkSpawner;

impl WorkerSpawner for ForkSpawner {
    fn spawn(&mut self, entry: &mut dyn FnMut(WorkerHandle) -> i32) -> Result<WorkerHandle, SpawnError> {
        // SAFETY: the master is single-threaded, and the child never returns
        // into the caller: it runs `entry` and exits.
        match unsafe { fork() }? {
            ForkResult::Parent { child } => {
                debug!(pid = child.as_raw(), "Spawned worker");
                Ok(WorkerHandle::new(child))
            }
            ForkResult::Child => {
                let code = entry(WorkerHandle::new(getpid()));
                std::process::exit(code)
            }
        }
    }



    /*
        @@@
        @try_reap();
        . Waits non-blockingly for any child of this process.
        . Exits and deaths by signal are reported; an empty process table (ECHILD) means nothing to reap.
        . Interrupted waits are retried.
    */
    fn try_reap(&mut self) -> nix::Result<Option<Reaped>> {
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(pid, code)) => {
                    return Ok(Some(Reaped { pid, exit: WorkerExit::Exited(code) }));
                }
                Ok(WaitStatus::Signaled(pid, sig, _)) => {
                    return Ok(Some(Reaped { pid, exit: WorkerExit::Signaled(sig) }));
                }
                Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => return Ok(None),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e),
                Ok(_) => continue,
            }
        }
    }

    fn kill(&mut self, worker: &WorkerHandle, sig: Signal) -> nix::Result<()> {
        worker.signal(sig)
    }
}


/// Per-worker state, built fresh in the child from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerContext {
    pub name: String,
    pub user: Option<String>,
    pub group: Option<String>,
}

impl WorkerContext {
    pub fn from_config(cfg: &DaemonConfig) -> Self {
        WorkerContext {
            name: cfg.name.clone(),
            user: cfg.user().map(str::to_owned),
            group: cfg.group().map(str::to_owned),
        }
    }
}



/*
    @@@
    @worker_main();
    . Drops to the configured group and user; a failed switch ends the worker before any user code runs.
    . That exit is reaped like any other: with auto restart an unknown user/group makes the master fork and reap in a tight loop, so check the names before enabling it.
    . Names the process "<name>: worker" and logs the start.
    . Runs the user callback with the worker's own handle and turns its outcome into an exit code (panics included).
*/
pub fn worker_main(ctx: WorkerContext, me: WorkerHandle, callback: &mut WorkerFn) -> i32 {
    let pid = me.pid().as_raw();

    if let Err(e) = drop_privileges(ctx.user.as_deref(), ctx.group.as_deref()) {
        error!(pid, error = %e, "Cannot drop worker privileges, exiting");
        return EXIT_WORKER_FAILURE;
    }

    if !ctx.name.is_empty() {
        if let Err(e) = set_process_title(&format!("{}: worker", ctx.name)) {
            debug!(pid, error = %e, "Cannot set process title");
        }
    }

    info!(pid, "{} worker start", ctx.name);

    match panic::catch_unwind(AssertUnwindSafe(|| callback(&me))) {
        Ok(()) => 0,
        Err(_) => {
            error!(pid, "Worker callback panicked");
            EXIT_WORKER_FAILURE
        }
    }
}


/// Switches gid first, then uid; after the uid change setgid would be refused.
pub fn drop_privileges(user: Option<&str>, group: Option<&str>) -> Result<(), PrivilegeError> {
    if let Some(group) = group {
        trace!(group, "Set worker process group");
        let gid = Group::from_name(group)
            .map_err(|source| PrivilegeError::Lookup { name: group.to_owned(), source })?
            .ok_or_else(|| PrivilegeError::UnknownGroup(group.to_owned()))?
            .gid;
        setgid(gid).map_err(|source| PrivilegeError::SetGid { group: group.to_owned(), source })?;
    }

    if let Some(user) = user {
        trace!(user, "Set worker process user");
        let uid = User::from_name(user)
            .map_err(|source| PrivilegeError::Lookup { name: user.to_owned(), source })?
            .ok_or_else(|| PrivilegeError::UnknownUser(user.to_owned()))?
            .uid;
        setuid(uid).map_err(|source| PrivilegeError::SetUid { user: user.to_owned(), source })?;
    }

    Ok(())
}

/// Kernel-visible process name (`ps -o comm`, `top`). Linux keeps the first 15 bytes.
#[cfg(target_os = "linux")]
pub fn set_process_title(title: &str) -> nix::Result<()> {
    let name = std::ffi::CString::new(title).map_err(|_| Errno::EINVAL)?;
    nix::sys::prctl::set_name(&name)
}

#[cfg(not(target_os = "linux"))]
pub fn set_process_title(_title: &str) -> nix::Result<()> {
    Ok(())
}

/// Detaches from the controlling terminal: the parent exits 0, the child leads a new session.
pub fn daemonize() -> nix::Result<()> {
    // SAFETY: called from the single-threaded master before any worker exists.
    match unsafe { fork() }? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {
            setsid()?;
            Ok(())
        }
    }
}
