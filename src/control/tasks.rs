use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::control::state::TaskKind;

/// Fire-and-forget tasks, at most one per kind.
///
/// Tasks are never aborted from here; each one watches the shared mode and
/// exits on its own.
#[derive(Default)]
pub struct TaskSet {
    running: Mutex<HashMap<TaskKind, JoinHandle<()>>>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `fut` unless a task of the same kind is still running.
    pub fn try_spawn<F>(&self, kind: TaskKind, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.get(&kind).is_some_and(|h| !h.is_finished()) {
            tracing::debug!(?kind, "task already in flight");
            return false;
        }
        running.insert(kind, tokio::spawn(fut));
        true
    }

    pub fn is_running(&self, kind: TaskKind) -> bool {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.get(&kind).is_some_and(|h| !h.is_finished())
    }

    /// Drop handles of tasks that already finished.
    pub fn reap(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.retain(|_, h| !h.is_finished());
    }

    pub fn in_flight(&self) -> usize {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.values().filter(|h| !h.is_finished()).count()
    }
}

/// Single-flight flag for the secondary-target handler.
#[derive(Debug, Default)]
pub struct ActionLock {
    held: Arc<AtomicBool>,
}

impl ActionLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// `None` while another guard is alive.
    pub fn try_acquire(&self) -> Option<ActionLockGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ActionLockGuard { held: self.held.clone() })
    }
}

/// Releases the lock on drop, on every exit path of the owning task.
#[derive(Debug)]
pub struct ActionLockGuard {
    held: Arc<AtomicBool>,
}

impl Drop for ActionLockGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}
