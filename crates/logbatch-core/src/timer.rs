use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::AbortHandle;

use crate::config::TimerPoolConfig;
use crate::error::{BatchError, Result};
use crate::shutdown::ShutdownHook;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;
const FINISHED: u8 = 3;

/// Delayed-task executor shared by every scheduler in the process
///
/// Cloning is cheap and every clone refers to the same pool. Each scheduled
/// task runs as its own tokio task, so a slow delivery only occupies its own
/// task and other schedulers' timers keep firing on time.
///
/// The pool either owns a dedicated multi-threaded runtime ([`new`](Self::new))
/// or borrows an existing one ([`from_handle`](Self::from_handle)). An owned
/// runtime is torn down in the background when the last clone is dropped, so
/// it never blocks process exit.
#[derive(Clone)]
pub struct SharedTimerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    name: String,
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
    max_pending: usize,
    pending: Arc<AtomicUsize>,
    closed: AtomicBool,
    shutdown_hook: ShutdownHook,
}

impl SharedTimerPool {
    /// Create a pool backed by its own runtime
    pub fn new(config: &TimerPoolConfig) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name(config.thread_name.clone())
            .enable_time()
            .build()
            .map_err(|e| BatchError::Runtime(format!("Failed to start timer runtime: {}", e)))?;
        let handle = runtime.handle().clone();

        tracing::debug!(
            "Started timer pool '{}' with {} workers",
            config.thread_name,
            config.worker_threads.max(1)
        );

        Ok(Self::assemble(
            config.thread_name.clone(),
            handle,
            Some(runtime),
            config.max_pending,
        ))
    }

    /// Create a pool that schedules onto an existing runtime
    pub fn from_handle(handle: Handle) -> Self {
        Self::from_handle_with_config(handle, &TimerPoolConfig::default())
    }

    pub fn from_handle_with_config(handle: Handle, config: &TimerPoolConfig) -> Self {
        Self::assemble(config.thread_name.clone(), handle, None, config.max_pending)
    }

    /// Create a pool on the runtime the caller is running in
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::from_handle)
            .map_err(|e| BatchError::Runtime(e.to_string()))
    }

    fn assemble(name: String, handle: Handle, runtime: Option<Runtime>, max_pending: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                name,
                handle,
                runtime: Mutex::new(runtime),
                max_pending,
                pending: Arc::new(AtomicUsize::new(0)),
                closed: AtomicBool::new(false),
                shutdown_hook: ShutdownHook::new(),
            }),
        }
    }

    /// Run `task` after `delay`
    ///
    /// The returned handle can cancel the task for as long as it has not
    /// started. Fails once the pool is shut down, or when `max_pending`
    /// timers are already outstanding.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> Result<TimerHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shut_down() {
            return Err(BatchError::PoolShutdown);
        }

        let outstanding = self.inner.pending.fetch_add(1, Ordering::AcqRel);
        let guard = PendingGuard(Arc::clone(&self.inner.pending));
        if outstanding >= self.inner.max_pending {
            return Err(BatchError::PoolExhausted {
                limit: self.inner.max_pending,
            });
        }

        let state = Arc::new(AtomicU8::new(PENDING));
        let task_state = Arc::clone(&state);
        let join = self.inner.handle.spawn(async move {
            let _guard = guard;
            tokio::time::sleep(delay).await;
            if task_state
                .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            task.await;
            task_state.store(FINISHED, Ordering::Release);
        });

        Ok(TimerHandle {
            state,
            abort: join.abort_handle(),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Timers scheduled but not yet completed or dropped
    pub fn pending_timers(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn shutdown_hook(&self) -> &ShutdownHook {
        &self.inner.shutdown_hook
    }

    /// Refuse new timers and flush every registered batcher
    ///
    /// Returns the number of batchers flushed.
    pub async fn shutdown(&self) -> usize {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }
        tracing::info!("Shutting down timer pool '{}'", self.inner.name);
        self.inner.shutdown_hook.run().await
    }
}

impl std::fmt::Debug for SharedTimerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTimerPool")
            .field("name", &self.inner.name)
            .field("pending", &self.pending_timers())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        let runtime = self
            .runtime
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
    }
}

struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Cancellable reference to a scheduled task
#[derive(Debug)]
pub struct TimerHandle {
    state: Arc<AtomicU8>,
    abort: AbortHandle,
}

impl TimerHandle {
    /// Try to stop the task before it starts
    ///
    /// Returns `true` if the task will never run. Never blocks; a task that
    /// already started is left to finish.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if cancelled {
            self.abort.abort();
        }
        cancelled
    }

    pub fn has_started(&self) -> bool {
        matches!(self.state.load(Ordering::Acquire), RUNNING | FINISHED)
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    pub fn is_finished(&self) -> bool {
        self.state.load(Ordering::Acquire) == FINISHED
    }
}
