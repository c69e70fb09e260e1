//! Server output monitoring.
//!
//! [`LogMonitor`] consumes the merged output of one server process and
//! drives a small state machine:
//!
//! | State      | Line contains     | Effect                                       |
//! |------------|-------------------|----------------------------------------------|
//! | `Watching` | success token     | announce, then stop (stop-after-start) or open browser → `Running` |
//! | `Watching` | `ERROR`           | terminate the process → `Stopped`            |
//! | `Running`  | `ERROR`           | terminate the process → `Stopped`            |
//! | `Stopped`  | (anything)        | consumption ends                              |
//!
//! An `ERROR` line is a soft shutdown: the process is terminated but no error
//! is raised. Every line, plus the monitor's own status lines, is appended to
//! the per-server log file whether or not it is echoed to the console.

pub mod codec;
pub mod log_file;

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::server::{BrowserLaunchRequest, BrowserOpener, ServerKind};
use crate::supervisor::ProcessSlot;

pub use codec::{output_lines, OutputCodec, OutputLines};
pub use log_file::ServerLog;

/// Literal marker that triggers a soft shutdown.
pub const ERROR_MARKER: &str = "ERROR";

/// Monitor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Waiting for the success token.
    Watching,
    /// Server announced ready.
    Running,
    /// Consumption ended after a shutdown.
    Stopped,
}

/// What a single line means for the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineVerdict {
    /// The success token was seen while watching.
    Ready,
    /// The error marker was seen.
    Error,
    /// Nothing of interest.
    Continue,
}

/// Classify `line` against the rules of `state`, success token first.
#[must_use]
pub fn classify(state: MonitorState, line: &str, success_token: &str) -> LineVerdict {
    match state {
        MonitorState::Stopped => LineVerdict::Continue,
        MonitorState::Watching if line.contains(success_token) => LineVerdict::Ready,
        MonitorState::Watching | MonitorState::Running if line.contains(ERROR_MARKER) => {
            LineVerdict::Error
        }
        MonitorState::Watching | MonitorState::Running => LineVerdict::Continue,
    }
}

/// Summary returned when a monitor finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOutcome {
    /// State when consumption ended.
    pub state: MonitorState,
    /// Readiness announcements made (0 or 1).
    pub announcements: u32,
    /// Lines consumed.
    pub lines: u64,
}

/// Browser target opened once the server is ready.
pub struct BrowserTarget {
    /// Opener collaborator.
    pub opener: Arc<dyn BrowserOpener>,
    /// URL to open.
    pub request: BrowserLaunchRequest,
}

/// Consumer of one server process's output.
pub struct LogMonitor {
    process_id: u64,
    kind: ServerKind,
    port: u16,
    stop_after_start: bool,
    echo: bool,
    browser: Option<BrowserTarget>,
    slot: Arc<ProcessSlot>,
    log: Arc<ServerLog>,
    state: MonitorState,
    announcements: u32,
    lines: u64,
}

impl LogMonitor {
    /// Create a monitor for process `process_id` held in `slot`.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        process_id: u64,
        kind: ServerKind,
        port: u16,
        stop_after_start: bool,
        echo: bool,
        browser: Option<BrowserTarget>,
        slot: Arc<ProcessSlot>,
        log: Arc<ServerLog>,
    ) -> Self {
        Self {
            process_id,
            kind,
            port,
            stop_after_start,
            echo,
            browser,
            slot,
            log,
            state: MonitorState::Watching,
            announcements: 0,
            lines: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Process one output line and return the resulting state.
    pub fn observe(&mut self, line: &str) -> MonitorState {
        if self.state == MonitorState::Stopped {
            return self.state;
        }

        self.lines += 1;
        self.log.append(line);
        if self.echo {
            info!(target: "devrun::server", "{line}");
        }

        match classify(self.state, line, self.kind.success_token()) {
            LineVerdict::Ready => self.on_ready(),
            LineVerdict::Error => self.on_error(line),
            LineVerdict::Continue => {}
        }
        self.state
    }

    fn on_ready(&mut self) {
        self.state = MonitorState::Running;
        self.announcements += 1;

        let message = format!(
            "{} is now serving at http://localhost:{}/",
            self.kind.server_name(),
            self.port
        );
        info!(server = self.kind.server_name(), port = self.port, "{message}");
        self.log.status(&message);

        if self.stop_after_start {
            self.log.status("stop after start requested; terminating");
            self.slot.terminate_process(self.process_id);
            self.state = MonitorState::Stopped;
            return;
        }

        if let Some(ref target) = self.browser {
            let url = target.request.url();
            match target.opener.open(&url) {
                Ok(()) => info!(%url, "opened browser"),
                Err(err) => warn!(%err, %url, "failed to open browser"),
            }
        }
    }

    fn on_error(&mut self, line: &str) {
        warn!(server = self.kind.server_name(), line, "error in server output; stopping server");
        self.log
            .status("error detected in server output; terminating server");
        self.slot.terminate_process(self.process_id);
        self.state = MonitorState::Stopped;
    }

    /// Consume `lines` until the stream ends, the monitor stops, or `cancel` fires.
    pub async fn run<S>(mut self, mut lines: S, cancel: CancellationToken) -> MonitorOutcome
    where
        S: Stream<Item = String> + Unpin,
    {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(process_id = self.process_id, "log monitor cancelled");
                    break;
                }
                next = lines.next() => match next {
                    Some(line) => {
                        if self.observe(&line) == MonitorState::Stopped {
                            break;
                        }
                    }
                    None => {
                        debug!(process_id = self.process_id, "server output closed");
                        break;
                    }
                },
            }
        }

        MonitorOutcome {
            state: self.state,
            announcements: self.announcements,
            lines: self.lines,
        }
    }
}
