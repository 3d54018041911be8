use crate::control::{self, Event, SignalEvents};
use crate::error::{DaemonError, SpawnError};
use crate::lock::LockGuard;
use crate::parse::DaemonConfig;
use crate::pidfile;
use crate::registry::WorkerRegistry;
use crate::runtime::{
    self, ForkSpawner, Reaped, WorkerContext, WorkerExit, WorkerFn, WorkerHandle, WorkerSpawner,
};
use nix::sys::signal::Signal;
use nix::unistd::{getpid, Pid};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Stopped,
    Starting,
    Running,
    ShuttingDown,
}

/// What the event loop should do after an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Shutdown found no worker left to wait for; control goes back to the caller.
    Stop,
    /// The pool drained without auto restart; the master process exits with this code.
    Exit(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Master,
    Worker,
}

/// The master: owns the lock, the pid file and the worker pool.
pub struct Supervisor<S: WorkerSpawner = ForkSpawner> {
    config: DaemonConfig,
    auto_restart: bool,
    spawner: S,
    on_worker_start: Option<WorkerFn>,
    workers: WorkerRegistry,
    lock: LockGuard,
    pid_file: Option<PathBuf>,
    signals: Option<SignalEvents>,
    state: State,
    role: Role,
}

impl Supervisor<ForkSpawner> {
    pub fn new(config: DaemonConfig) -> Self {
        Supervisor::with_spawner(config, ForkSpawner)
    }
}

impl<S: WorkerSpawner> Supervisor<S> {
    pub fn with_spawner(config: DaemonConfig, spawner: S) -> Self {
        Supervisor {
            auto_restart: config.auto_restart,
            config,
            spawner,
            on_worker_start: None,
            workers: WorkerRegistry::default(),
            lock: LockGuard::disabled(),
            pid_file: None,
            signals: None,
            state: State::Stopped,
            role: Role::Master,
        }
    }

    /// Body run inside every worker. Required before [`Supervisor::start`].
    pub fn on_worker_start<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&WorkerHandle) + 'static,
    {
        self.on_worker_start = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn auto_restart(&self) -> bool {
        self.auto_restart
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_held()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.count()
    }

    pub fn for_each_worker(&self, f: impl FnMut(Pid, &WorkerHandle)) {
        self.workers.for_each(f)
    }



    /*
        @@@
        @run();
        . Takes the lock, detaches if configured, writes the pid file and names the master (see start()).
        . Subscribes to SIGTERM/SIGINT/SIGCHLD before the first fork so no early worker death goes unnoticed.
        . Spawns the pool, then handles queued signals one by one until the pool drains (process exits 0) or shutdown has nothing left to wait for.
    */
    pub fn run(mut self) -> Result<(), DaemonError> {
        self.start()?;
        self.listen()?;
        self.spawn_workers();

        while let Some(event) = self.next_event() {
            match self.handle(event) {
                Flow::Continue => {}
                Flow::Stop => return Ok(()),
                Flow::Exit(code) => std::process::exit(code),
            }
        }
        Ok(())
    }

    /// Subscribes the master to SIGTERM/SIGINT/SIGCHLD. A failure releases what start() took.
    pub fn listen(&mut self) -> Result<(), DaemonError> {
        match SignalEvents::register() {
            Ok(events) => {
                self.signals = Some(events);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Cannot register signal handlers");
                self.release_resources();
                self.state = State::Stopped;
                Err(DaemonError::Signals(e))
            }
        }
    }

    /// Blocks for the next queued signal. `None` when not listening or the queue broke.
    pub fn next_event(&mut self) -> Option<Event> {
        self.signals.as_mut()?.next_event()
    }



    /*
        @@@
        @start();
        . Moves Stopped -> Starting. Refuses to start without a worker callback or twice.
        . A lock that cannot be taken aborts the start with nothing else touched; state falls back to Stopped.
        . Detaching, the pid file and the process title come after the lock; pid file failures only warn.
    */
    pub fn start(&mut self) -> Result<(), DaemonError> {
        if self.state != State::Stopped || self.lock.is_held() {
            return Err(DaemonError::AlreadyStarted);
        }
        if self.on_worker_start.is_none() {
            return Err(DaemonError::MissingWorkerStart);
        }
        self.state = State::Starting;

        let lock_path = self.config.lock_file_path();
        self.lock = match LockGuard::acquire(lock_path.as_deref()) {
            Ok(lock) => lock,
            Err(e) => {
                error!(error = %e, "{} master start failed", self.config.name);
                self.state = State::Stopped;
                return Err(e.into());
            }
        };
        info!("{} master start", self.config.name);

        if self.config.daemonize {
            if let Err(e) = runtime::daemonize() {
                error!(error = %e, "Cannot detach from the controlling terminal");
                self.lock.release();
                self.state = State::Stopped;
                return Err(DaemonError::Daemonize(e));
            }
            info!(pid = getpid().as_raw(), "Daemonized");
        }

        if let Some(path) = self.config.pid_file_path() {
            match pidfile::write(&path, getpid()) {
                Ok(()) => self.pid_file = Some(path),
                Err(e) => warn!(path = %path.display(), error = %e, "Cannot put pid file"),
            }
        }

        if !self.config.name.is_empty() {
            if let Err(e) = runtime::set_process_title(&format!("{}: master", self.config.name)) {
                debug!(error = %e, "Cannot set process title");
            }
        }
        Ok(())
    }

    /// Spawns the initial pool and enters Running. Returns how many workers came up.
    pub fn spawn_workers(&mut self) -> usize {
        let mut started = 0;
        for _ in 0..self.config.worker_num {
            match self.spawn_worker() {
                Ok(_) => started += 1,
                Err(e) => error!(error = %e, "Cannot spawn worker"),
            }
        }
        if started < self.config.worker_num {
            warn!(requested = self.config.worker_num, started, "Worker pool started short");
        }
        self.state = State::Running;
        started
    }

    pub fn handle(&mut self, event: Event) -> Flow {
        match event {
            Event::ChildExited => self.handle_child_exit(),
            Event::Terminate(sig) => self.handle_terminate(sig),
        }
    }



    /*
        @@@
        @handle_child_exit();
        . Drains every waitable child: one SIGCHLD may stand for several exits.
        . Each reaped worker leaves the registry first, then gets a replacement when auto restart is on.
        . Without auto restart, the last worker gone ends the master: lock and pid file are released and Exit(0) is returned.
    */
    fn handle_child_exit(&mut self) -> Flow {
        if self.role != Role::Master {
            return Flow::Continue;
        }
        info!(pid = getpid().as_raw(), "Receive SIGCHLD");

        loop {
            let Reaped { pid, exit } = match self.spawner.try_reap() {
                Ok(Some(reaped)) => reaped,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "waitpid failed");
                    break;
                }
            };

            match exit {
                WorkerExit::Exited(code) => info!(pid = pid.as_raw(), exit_code = code, "Worker exited"),
                WorkerExit::Signaled(sig) => {
                    warn!(pid = pid.as_raw(), signal = ?sig, "Worker killed by signal")
                }
            }

            if self.workers.remove(pid).is_none() {
                debug!(pid = pid.as_raw(), "Reaped a child that is not a tracked worker");
                continue;
            }

            if self.auto_restart {
                info!("Auto restart");
                if let Err(e) = self.spawn_worker() {
                    error!(error = %e, "Cannot respawn worker");
                }
            } else if self.workers.is_empty() {
                info!("All child processes killed, exit");
                self.release_resources();
                self.state = State::Stopped;
                return Flow::Exit(0);
            }
        }
        Flow::Continue
    }



    /*
        @@@
        @handle_terminate();
        . Only the master acts; a worker holding a copy of the handlers does nothing.
        . Turns auto restart off first so exits caused by the shutdown are not respawned.
        . Sends SIGQUIT to every tracked worker, then releases the lock and removes the pid file. Safe to repeat.
    */
    fn handle_terminate(&mut self, sig: Signal) -> Flow {
        if self.role != Role::Master {
            return Flow::Continue;
        }
        info!(signal = ?sig, "Receive {}", sig.as_str());
        self.state = State::ShuttingDown;
        self.auto_restart = false;

        let spawner = &mut self.spawner;
        self.workers.for_each(|pid, worker| {
            if let Err(e) = spawner.kill(worker, Signal::SIGQUIT) {
                warn!(pid = pid.as_raw(), error = %e, "Cannot send SIGQUIT to worker");
            }
        });
        self.release_resources();

        if self.workers.is_empty() {
            self.state = State::Stopped;
            return Flow::Stop;
        }
        Flow::Continue
    }

    fn spawn_worker(&mut self) -> Result<WorkerHandle, SpawnError> {
        let Supervisor { config, spawner, on_worker_start, lock, signals, role, .. } = &mut *self;

        let handle = spawner.spawn(&mut |me| {
            // from here on this is the child's own copy of the supervisor
            *role = Role::Worker;
            lock.abandon();
            control::release_in_worker(signals.take());

            match on_worker_start.as_mut() {
                Some(callback) => runtime::worker_main(WorkerContext::from_config(&*config), me, callback),
                None => runtime::EXIT_WORKER_FAILURE,
            }
        })?;

        if !self.workers.insert(handle) {
            warn!(pid = handle.pid().as_raw(), "Spawned worker pid is already tracked");
        }
        Ok(handle)
    }

    fn release_resources(&mut self) {
        if self.lock.release() {
            debug!("Lock released");
        }
        if let Some(path) = self.pid_file.take() {
            pidfile::remove(&path);
        }
    }
}
