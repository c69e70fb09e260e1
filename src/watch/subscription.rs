//! Watch subscriptions and the `notify`-backed directory watch primitive.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use super::{Debouncer, LivenessGate, WatchAction, WatchScheduler};
use crate::{AppError, Result};

/// Decides which raw events are relevant to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Every change event.
    Any,
    /// Only events touching a path with this extension (ASCII case-insensitive, no dot).
    Extension(String),
}

impl EventFilter {
    /// Whether `path` passes the filter.
    #[must_use]
    pub fn matches_path(&self, path: &Path) -> bool {
        match self {
            Self::Any => true,
            Self::Extension(ext) => path
                .extension()
                .is_some_and(|found| found.eq_ignore_ascii_case(ext.as_str())),
        }
    }

    /// Whether `event` is a change event that passes the filter.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if !is_change(event) {
            return false;
        }
        match self {
            Self::Any => true,
            Self::Extension(_) => event.paths.iter().any(|path| self.matches_path(path)),
        }
    }
}

/// Returns `true` for create, modify, and remove events (and unclassified ones).
fn is_change(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// One watched directory with its own filter and timer slot.
pub struct WatchSubscription {
    dir: PathBuf,
    filter: EventFilter,
    debouncer: Debouncer,
    gate: Arc<dyn LivenessGate>,
}

impl WatchSubscription {
    /// Bind `dir` to `filter` and a fresh debouncer running `action`.
    #[must_use]
    pub fn new(
        dir: PathBuf,
        filter: EventFilter,
        window: Duration,
        action: Arc<dyn WatchAction>,
        gate: Arc<dyn LivenessGate>,
        scheduler: WatchScheduler,
    ) -> Self {
        let name = format!("{}:{}", action.name(), dir.display());
        Self {
            debouncer: Debouncer::new(name, window, action, scheduler),
            dir,
            filter,
            gate,
        }
    }

    /// Watched directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Event filter.
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// The subscription's debouncer.
    #[must_use]
    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    /// Feed a raw event; returns `true` if it rescheduled the debouncer.
    ///
    /// Events are ignored while the server process is not alive.
    pub fn handle_event(&self, event: &Event) -> bool {
        if !self.filter.matches(event) {
            return false;
        }
        if !self.gate.is_live() {
            debug!(dir = %self.dir.display(), "server not running; change ignored");
            return false;
        }
        self.debouncer.trigger();
        true
    }
}

/// Live OS watch feeding one subscription. Dropping it stops the watch.
pub struct DirectoryWatch {
    _watcher: RecommendedWatcher,
    subscription: Arc<WatchSubscription>,
}

impl DirectoryWatch {
    /// Start watching the subscription's directory recursively.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Watch` if the watcher cannot be created or the
    /// directory cannot be watched.
    pub fn start(subscription: Arc<WatchSubscription>) -> Result<Self> {
        let target = Arc::clone(&subscription);
        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => {
                    target.handle_event(&event);
                }
                Err(err) => {
                    warn!(%err, dir = %target.dir().display(), "directory watcher error");
                }
            },
        )
        .map_err(|err| AppError::Watch(format!("failed to create directory watcher: {err}")))?;

        watcher
            .watch(subscription.dir(), RecursiveMode::Recursive)
            .map_err(|err| {
                AppError::Watch(format!(
                    "failed to watch '{}': {err}",
                    subscription.dir().display()
                ))
            })?;

        Ok(Self {
            _watcher: watcher,
            subscription,
        })
    }

    /// The subscription this watch feeds.
    #[must_use]
    pub fn subscription(&self) -> &Arc<WatchSubscription> {
        &self.subscription
    }
}

/// A set of independently debounced directory watches sharing one action.
pub struct WatchGroup {
    watches: Vec<DirectoryWatch>,
}

impl WatchGroup {
    /// One subscription per existing class output directory; every change counts.
    ///
    /// Directories that do not exist are skipped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Watch` if any existing directory cannot be watched.
    pub fn class_dirs(
        dirs: &[PathBuf],
        window: Duration,
        action: &Arc<dyn WatchAction>,
        gate: &Arc<dyn LivenessGate>,
        scheduler: &WatchScheduler,
    ) -> Result<Self> {
        let mut watches = Vec::new();
        for dir in dirs {
            if !dir.is_dir() {
                debug!(dir = %dir.display(), "class directory missing; not watched");
                continue;
            }
            let subscription = WatchSubscription::new(
                dir.clone(),
                EventFilter::Any,
                window,
                Arc::clone(action),
                Arc::clone(gate),
                scheduler.clone(),
            );
            watches.push(DirectoryWatch::start(Arc::new(subscription))?);
            info!(dir = %dir.display(), "watching class directory");
        }
        Ok(Self { watches })
    }

    /// A single subscription on the theme root, filtered to stylesheets.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Watch` if the theme directory cannot be watched.
    pub fn theme(
        dir: &Path,
        window: Duration,
        action: Arc<dyn WatchAction>,
        gate: Arc<dyn LivenessGate>,
        scheduler: WatchScheduler,
    ) -> Result<Self> {
        let subscription = WatchSubscription::new(
            dir.to_owned(),
            EventFilter::Extension(crate::theme::STYLESHEET_EXTENSION.to_owned()),
            window,
            action,
            gate,
            scheduler,
        );
        let watch = DirectoryWatch::start(Arc::new(subscription))?;
        info!(dir = %dir.display(), "watching theme directory");
        Ok(Self {
            watches: vec![watch],
        })
    }

    /// Subscriptions in this group.
    pub fn subscriptions(&self) -> impl Iterator<Item = &Arc<WatchSubscription>> {
        self.watches.iter().map(DirectoryWatch::subscription)
    }

    /// Number of watched directories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.watches.len()
    }

    /// Whether no directory is watched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }
}
