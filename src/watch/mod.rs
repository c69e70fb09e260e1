//! Debounced directory watching.
//!
//! A [`WatchSubscription`] binds one directory, an [`EventFilter`], and a
//! [`Debouncer`] (its own timer slot). Raw `notify` events that pass the
//! filter while the server is alive reschedule the debouncer; when the quiet
//! window elapses the subscription's [`WatchAction`] runs on the
//! debouncer's serial action worker.
//!
//! Subscriptions never coalesce with one another: a class directory and the
//! theme directory changing together fire two independent actions.

pub mod debouncer;
pub mod scheduler;
pub mod subscription;

pub use debouncer::Debouncer;
pub use scheduler::WatchScheduler;
pub use subscription::{DirectoryWatch, EventFilter, WatchGroup, WatchSubscription};

/// Work performed when a subscription's quiet window elapses.
///
/// Actions run on a blocking thread, one at a time per subscription, in the
/// order their windows expired.
pub trait WatchAction: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Perform the action.
    fn run(&self);
}

/// Reports whether watched changes should currently be acted upon.
pub trait LivenessGate: Send + Sync {
    /// `true` while the supervised server process is alive.
    fn is_live(&self) -> bool;
}
