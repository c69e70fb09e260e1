//! Supervisor-owned task scheduler for watch timers and action workers.

use std::future::Future;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::{AppError, Result};

/// Explicit scheduler handed to every [`super::Debouncer`].
///
/// Timers and workers are spawned on a fixed runtime handle, so they can be
/// scheduled from `notify`'s own callback threads. [`shutdown`](Self::shutdown)
/// cancels everything that was spawned and waits for it to finish.
#[derive(Clone)]
pub struct WatchScheduler {
    handle: Handle,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl WatchScheduler {
    /// Create a scheduler that spawns onto `handle`.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Create a scheduler bound to the runtime of the calling task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Watch` when called outside a tokio runtime.
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|err| AppError::Watch(format!("no tokio runtime for watch scheduler: {err}")))?;
        Ok(Self::new(handle))
    }

    /// Token cancelled when the scheduler shuts down.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether [`shutdown`](Self::shutdown) has been requested.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Spawn a tracked task on the scheduler's runtime.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn_on(task, &self.handle)
    }

    /// Cancel all timers and workers and wait for them to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        debug!("watch scheduler shut down");
    }
}
