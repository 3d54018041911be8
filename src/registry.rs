use crate::runtime::WorkerHandle;
use nix::unistd::Pid;
use std::collections::HashMap;

/// Live workers of the master, keyed by pid.
///
/// A pid is present from a successful spawn until its exit is reaped.
#[derive(Debug, Default)]
pub(crate) struct WorkerRegistry {
    workers: HashMap<Pid, WorkerHandle>,
}

impl WorkerRegistry {
    /// Returns `false` and keeps the existing entry if the pid is already tracked.
    pub fn insert(&mut self, handle: WorkerHandle) -> bool {
        match self.workers.entry(handle.pid()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    pub fn remove(&mut self, pid: Pid) -> Option<WorkerHandle> {
        self.workers.remove(&pid)
    }

    pub fn count(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn for_each(&self, mut f: impl FnMut(Pid, &WorkerHandle)) {
        for (pid, handle) in &self.workers {
            f(*pid, handle);
        }
    }
}
