//! The running server process and the shared slot that owns it.
//!
//! The OS [`Child`] is moved into a dedicated exit-waiter task. Everything
//! else talks to it through a [`ServerProcess`] handle: a stop token that
//! asks the waiter to destroy the child, and a `watch` channel on which the
//! waiter publishes the exit exactly once.
//!
//! [`ProcessSlot`] holds at most one handle. `terminate` takes the handle out
//! of the slot under its lock, so concurrent callers collapse to a single
//! destroy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::watch::LivenessGate;

/// How a server process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, or `None` when killed by a signal.
    pub code: Option<i32>,
    /// The exit was caused by `terminate`.
    pub requested: bool,
}

impl ProcessExit {
    /// Exit code with signal deaths reported as `-1`.
    #[must_use]
    pub fn code_or_signal(&self) -> i32 {
        self.code.unwrap_or(-1)
    }

    /// A non-zero exit the supervisor did not ask for.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.requested && self.code != Some(0)
    }
}

/// Awaitable view of a process exit.
#[derive(Debug, Clone)]
pub struct ExitWatch {
    rx: watch::Receiver<Option<ProcessExit>>,
}

impl ExitWatch {
    /// Exit, if it has already happened.
    #[must_use]
    pub fn current(&self) -> Option<ProcessExit> {
        *self.rx.borrow()
    }

    /// Wait until the process has exited.
    pub async fn wait(&mut self) -> ProcessExit {
        match self.rx.wait_for(Option::is_some).await {
            Ok(exit) => (*exit).unwrap_or(ProcessExit {
                code: None,
                requested: false,
            }),
            // Waiter task vanished without reporting.
            Err(_) => ProcessExit {
                code: None,
                requested: false,
            },
        }
    }
}

/// Handle to a spawned server process.
#[derive(Debug)]
pub struct ServerProcess {
    id: u64,
    pid: Option<u32>,
    stop: CancellationToken,
    exit: ExitWatch,
}

impl ServerProcess {
    /// Take ownership of `child` and start its exit-waiter task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn adopt(id: u64, child: Child, grace: Duration) -> Self {
        let pid = child.id();
        let stop = CancellationToken::new();
        let (tx, rx) = watch::channel(None);
        tokio::spawn(wait_for_exit(child, stop.clone(), grace, tx));
        Self {
            id,
            pid,
            stop,
            exit: ExitWatch { rx },
        }
    }

    /// Generation id assigned by the slot.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// OS process id.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process has not yet exited.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.exit.current().is_none()
    }

    /// Awaitable exit of this process.
    #[must_use]
    pub fn exit_watch(&self) -> ExitWatch {
        self.exit.clone()
    }

    pub(crate) fn destroy(&self) {
        self.stop.cancel();
    }
}

/// Exit-waiter: owns the child until it exits or is told to stop.
async fn wait_for_exit(
    mut child: Child,
    stop: CancellationToken,
    grace: Duration,
    tx: watch::Sender<Option<ProcessExit>>,
) {
    let pid = child.id();
    let (status, requested) = tokio::select! {
        status = child.wait() => (status, false),
        () = stop.cancelled() => (shutdown_child(&mut child, grace).await, true),
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(err) => {
            warn!(?pid, %err, "error waiting for server process");
            None
        }
    };

    debug!(?pid, ?code, requested, "server process exited");
    let _ = tx.send(Some(ProcessExit { code, requested }));
}

/// Ask the child to stop, then kill it if it outlives `grace`.
async fn shutdown_child(
    child: &mut Child,
    grace: Duration,
) -> std::io::Result<std::process::ExitStatus> {
    request_stop(child);
    if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
        return status;
    }
    warn!(pid = ?child.id(), ?grace, "server ignored stop request; killing");
    child.kill().await?;
    child.wait().await
}

#[cfg(unix)]
fn request_stop(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(pid, %err, "SIGTERM delivery failed");
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        debug!(%err, "kill request failed");
    }
}

/// Shared, single-occupancy cell for the server process handle.
#[derive(Debug, Default)]
pub struct ProcessSlot {
    current: Mutex<Option<ServerProcess>>,
    next_id: AtomicU64,
    destroyed: AtomicU64,
}

impl ProcessSlot {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ServerProcess>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate the id for the next process.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether a handle is set, even if that process has already exited.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.lock().is_some()
    }

    /// Whether a handle is set and its process is still alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock().as_ref().is_some_and(ServerProcess::is_running)
    }

    /// Id of the process currently in the slot.
    #[must_use]
    pub fn current_id(&self) -> Option<u64> {
        self.lock().as_ref().map(ServerProcess::id)
    }

    /// Number of processes destroyed through this slot.
    #[must_use]
    pub fn destroyed_count(&self) -> u64 {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Put `process` in the slot. Hands it back if the slot is occupied.
    ///
    /// # Errors
    ///
    /// Returns the rejected process when a handle is already set.
    pub fn install(&self, process: ServerProcess) -> std::result::Result<(), ServerProcess> {
        let mut current = self.lock();
        if current.is_some() {
            return Err(process);
        }
        *current = Some(process);
        Ok(())
    }

    /// Destroy and clear the current process. Returns `false` when the slot was empty.
    pub fn terminate(&self) -> bool {
        let taken = self.lock().take();
        self.destroy(taken)
    }

    /// Like [`terminate`](Self::terminate), but only if the slot still holds process `id`.
    pub fn terminate_process(&self, id: u64) -> bool {
        let taken = {
            let mut current = self.lock();
            if current.as_ref().is_some_and(|process| process.id() == id) {
                current.take()
            } else {
                None
            }
        };
        self.destroy(taken)
    }

    fn destroy(&self, taken: Option<ServerProcess>) -> bool {
        let Some(process) = taken else {
            return false;
        };
        process.destroy();
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        info!(pid = ?process.pid(), id = process.id(), "server process terminated");
        true
    }
}

impl LivenessGate for ProcessSlot {
    fn is_live(&self) -> bool {
        self.is_running()
    }
}
