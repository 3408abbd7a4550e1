//! Execution contexts probes are dispatched on.
//!
//! The coordinator does not own threads. It hands each dispatch to an
//! [`Executor`], which may run it inline ([`DirectExecutor`], for
//! deterministic tests) or on a tokio runtime with bounded concurrency
//! ([`BoundedExecutor`]).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

use crate::config::CanMatchConfig;
use crate::error::EngineError;

/// A unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks now or soon.
///
/// An executor must either run a task or drop it. Dropping is how the
/// coordinator learns a dispatch never happened, so a task is never
/// retained after `execute` returns an error.
pub trait Executor: Send + Sync {
    /// Run `task`, inline or later on another thread.
    fn execute(&self, task: Task) -> Result<(), EngineError>;
}

/// Runs every task inline on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectExecutor;

impl Executor for DirectExecutor {
    fn execute(&self, task: Task) -> Result<(), EngineError> {
        task();
        Ok(())
    }
}

/// Runs tasks on a tokio runtime, at most `max_concurrent` at a time.
///
/// Tasks beyond that limit wait for a permit. Once `max_queued` tasks are
/// waiting, new ones are rejected. After [`shutdown`](Self::shutdown),
/// waiting tasks are dropped unrun and new ones are rejected.
pub struct BoundedExecutor {
    handle: Handle,
    permits: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
    max_queued: usize,
}

impl BoundedExecutor {
    /// Create an executor on `handle`.
    pub fn new(handle: Handle, max_concurrent: usize, max_queued: usize) -> Self {
        Self {
            handle,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            queued: Arc::new(AtomicUsize::new(0)),
            max_queued,
        }
    }

    /// Create an executor on `handle` sized from `config`.
    pub fn from_config(handle: Handle, config: &CanMatchConfig) -> Self {
        Self::new(handle, config.max_concurrent_tasks, config.max_queued_tasks)
    }

    /// Create an executor on the runtime the caller is running in.
    pub fn current(config: &CanMatchConfig) -> Result<Self, EngineError> {
        let handle = Handle::try_current().map_err(|e| EngineError::NoRuntime(e.to_string()))?;
        Ok(Self::from_config(handle, config))
    }

    /// Tasks waiting for a permit.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Permits not currently held by a running task.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Stop accepting work and drop waiting tasks.
    pub fn shutdown(&self) {
        debug!(queued = self.queued(), "shutting down bounded executor");
        self.permits.close();
    }
}

impl Executor for BoundedExecutor {
    fn execute(&self, task: Task) -> Result<(), EngineError> {
        if self.permits.is_closed() {
            return Err(EngineError::ExecutorShutdown);
        }

        let (slot, queued) = QueueSlot::claim(&self.queued);
        if queued >= self.max_queued {
            return Err(EngineError::Rejected {
                queued,
                limit: self.max_queued,
            });
        }

        let permits = Arc::clone(&self.permits);
        self.handle.spawn(async move {
            let permit = permits.acquire_owned().await;
            drop(slot);
            match permit {
                Ok(_permit) => task(),
                Err(_) => trace!("executor closed, dropping queued task"),
            }
        });

        Ok(())
    }
}

/// One task counted in [`BoundedExecutor::queued`]. Released when the
/// task gets a permit, or when its future is dropped unpolled because
/// the runtime shut down.
struct QueueSlot(Arc<AtomicUsize>);

impl QueueSlot {
    /// Count one more waiting task. Returns the slot and the count before it.
    fn claim(queued: &Arc<AtomicUsize>) -> (Self, usize) {
        let before = queued.fetch_add(1, Ordering::AcqRel);
        (Self(Arc::clone(queued)), before)
    }
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
