//! Append-only per-server log file.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use tracing::warn;

use crate::{AppError, Result};

/// Prefix marking lines written by the supervisor rather than the server.
const STATUS_PREFIX: &str = "[devrun]";

/// Appends every observed server line to `<build>/logs/<server>.log`.
pub struct ServerLog {
    path: PathBuf,
    writer: Mutex<BufWriter<fs::File>>,
}

impl ServerLog {
    /// Open (or create) the log file for appending, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory or file cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                AppError::Io(format!(
                    "failed to create log directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| {
                AppError::Io(format!("failed to open server log {}: {err}", path.display()))
            })?;
        Ok(Self {
            path: path.to_owned(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Location of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a raw server output line.
    pub fn append(&self, line: &str) {
        self.write_line(line);
    }

    /// Append a supervisor status line.
    pub fn status(&self, message: &str) {
        self.write_line(&format!("{STATUS_PREFIX} {message}"));
    }

    /// Append a timestamped header opening a new server run.
    pub fn session_header(&self, server_name: &str, pid: Option<u32>) {
        let pid = pid.map_or_else(|| "?".to_owned(), |pid| pid.to_string());
        self.status(&format!(
            "{server_name} started at {} (pid {pid})",
            Utc::now().to_rfc3339()
        ));
    }

    fn write_line(&self, line: &str) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
            warn!(%err, path = %self.path.display(), "failed to write server log");
        }
    }
}
