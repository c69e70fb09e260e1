//! Cancel-and-reschedule debouncer with a per-subscription timer slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, warn, Instrument};

use super::{WatchAction, WatchScheduler};

/// The single outstanding timer of a debouncer.
#[derive(Default)]
struct TimerSlot {
    /// Bumped on every trigger; a timer only fires if it still owns the latest value.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct DebounceState {
    name: String,
    slot: Mutex<TimerSlot>,
    actions: mpsc::UnboundedSender<u64>,
    fired: AtomicU64,
}

impl DebounceState {
    fn lock_slot(&self) -> MutexGuard<'_, TimerSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by a timer whose quiet window elapsed.
    ///
    /// The generation check and the hand-off to the action worker happen under
    /// the slot lock, so a superseded timer can never fire and windows are
    /// queued in expiry order.
    fn fire(&self, generation: u64) {
        let mut slot = self.lock_slot();
        if slot.generation != generation {
            debug!(subscription = %self.name, generation, "superseded debounce timer dropped");
            return;
        }
        slot.timer = None;
        self.fired.fetch_add(1, Ordering::SeqCst);
        if self.actions.send(generation).is_err() {
            debug!(subscription = %self.name, "action worker gone; debounced action skipped");
        }
    }
}

/// Coalesces bursts of events into one delayed action.
///
/// Each [`trigger`](Self::trigger) cancels the pending timer and schedules a
/// new one `window` after the latest event. When a timer survives its window
/// the action is queued on this debouncer's worker, which runs actions
/// serially on the blocking pool.
pub struct Debouncer {
    state: Arc<DebounceState>,
    window: Duration,
    scheduler: WatchScheduler,
}

impl Debouncer {
    /// Create a debouncer and start its action worker on `scheduler`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        window: Duration,
        action: Arc<dyn WatchAction>,
        scheduler: WatchScheduler,
    ) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(DebounceState {
            name: name.clone(),
            slot: Mutex::new(TimerSlot::default()),
            actions: tx,
            fired: AtomicU64::new(0),
        });

        scheduler.spawn(
            run_actions(rx, action, scheduler.clone())
                .instrument(info_span!("watch_action", subscription = %name)),
        );

        Self {
            state,
            window,
            scheduler,
        }
    }

    /// Subscription label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Quiet window measured from the latest event.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of timers that survived their quiet window.
    #[must_use]
    pub fn fired_count(&self) -> u64 {
        self.state.fired.load(Ordering::SeqCst)
    }

    /// Whether a timer is currently pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.lock_slot().timer.is_some()
    }

    /// Record an event: cancel the pending timer and schedule a fresh one.
    pub fn trigger(&self) {
        if self.scheduler.is_shut_down() {
            return;
        }

        let mut slot = self.state.lock_slot();
        slot.generation += 1;
        let generation = slot.generation;

        if let Some(previous) = slot.timer.take() {
            previous.abort();
        }

        let state = Arc::clone(&self.state);
        let window = self.window;
        let cancel = self.scheduler.token();
        slot.timer = Some(self.scheduler.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(window) => state.fire(generation),
            }
        }));
    }

    /// Cancel the pending timer without firing it.
    pub fn cancel(&self) {
        let mut slot = self.state.lock_slot();
        slot.generation += 1;
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Serial action worker: one action at a time, in queue order.
async fn run_actions(
    mut rx: mpsc::UnboundedReceiver<u64>,
    action: Arc<dyn WatchAction>,
    scheduler: WatchScheduler,
) {
    let cancel = scheduler.token();
    loop {
        let generation = tokio::select! {
            () = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(generation) => generation,
                None => break,
            },
        };

        debug!(action = action.name(), generation, "running debounced action");
        let job = Arc::clone(&action);
        if let Err(err) = tokio::task::spawn_blocking(move || job.run()).await {
            warn!(action = action.name(), %err, "debounced action panicked");
        }
    }
}
