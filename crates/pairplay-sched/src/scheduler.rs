//! Detached and delayed tasks.
//!
//! The match core never awaits slow collaborators while it holds its
//! lock. Work that can suspend (score reporting, delayed session teardown)
//! is handed to a [`Scheduler`], which spawns it on the Tokio runtime and
//! keeps an abort handle so [`Scheduler::shutdown`] can stop everything
//! that is still outstanding.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::{debug, trace};

/// Handle to a task spawned by a [`Scheduler`].
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: u64,
    abort: Option<AbortHandle>,
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Aborts the task if it hasn't run to completion yet.
    pub fn cancel(&self) {
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    /// `true` once the task completed, was cancelled, or was never
    /// started because the scheduler had already shut down.
    pub fn is_finished(&self) -> bool {
        self.abort.as_ref().is_none_or(AbortHandle::is_finished)
    }
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    closed: AtomicBool,
    tasks: Mutex<HashMap<u64, AbortHandle>>,
}

impl Inner {
    fn tasks(&self) -> MutexGuard<'_, HashMap<u64, AbortHandle>> {
        // The map only holds abort handles; a panic while it was locked
        // can't leave it inconsistent.
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Spawns detached and delayed work and tracks it until it finishes.
///
/// Cheap to clone; clones share the same task set.
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` after `delay`. The task runs without any caller lock
    /// held and is not cancelled when the returned handle is dropped.
    ///
    /// After [`shutdown`](Self::shutdown) nothing is spawned and the
    /// returned handle reports itself finished.
    pub fn schedule_after<F>(&self, delay: Duration, task: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn_tracked(Some(delay), task)
    }

    /// Runs `task` as soon as the runtime gets to it.
    pub fn spawn_detached<F>(&self, task: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn_tracked(None, task)
    }

    fn spawn_tracked<F>(&self, delay: Option<Duration>, task: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if self.inner.closed.load(Ordering::Acquire) {
            debug!(task_id = id, "scheduler shut down, task dropped");
            return TaskHandle { id, abort: None };
        }

        // Hold the map lock across spawn + insert so a task that finishes
        // immediately can't try to remove itself before it's been added.
        let mut tasks = self.inner.tasks();
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            task.await;
            inner.tasks().remove(&id);
            trace!(task_id = id, "scheduled task finished");
        });
        let abort = handle.abort_handle();
        tasks.insert(id, abort.clone());
        trace!(task_id = id, delay_ms = ?delay.map(|d| d.as_millis()), "task scheduled");

        TaskHandle {
            id,
            abort: Some(abort),
        }
    }

    /// Number of tasks that have been spawned and haven't finished.
    /// Cancelled tasks are dropped from the count lazily.
    pub fn pending(&self) -> usize {
        let mut tasks = self.inner.tasks();
        tasks.retain(|_, abort| !abort.is_finished());
        tasks.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Aborts every outstanding task and refuses new ones. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained: Vec<AbortHandle> =
            self.inner.tasks().drain().map(|(_, abort)| abort).collect();
        debug!(aborted = drained.len(), "scheduler shutting down");
        for abort in drained {
            abort.abort();
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.inner.tasks().len())
            .field("closed", &self.is_shut_down())
            .finish()
    }
}
