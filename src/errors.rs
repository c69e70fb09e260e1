//! Error types shared across the supervisor.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Only [`AppError::Startup`] and [`AppError::ServerExit`] describe the
/// fatal outcomes of a development session; every other variant is a
/// setup or collaborator failure.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The server process died immediately after being spawned.
    Startup(String),
    /// The server process exited with a non-zero code during the session.
    ServerExit(String),
    /// File-system watch registration failure.
    Watch(String),
    /// Theme compilation or compression failure.
    Theme(String),
    /// Classpath manifest or classpath jar failure.
    Classpath(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Startup(msg) => write!(f, "startup: {msg}"),
            Self::ServerExit(msg) => write!(f, "server exit: {msg}"),
            Self::Watch(msg) => write!(f, "watch: {msg}"),
            Self::Theme(msg) => write!(f, "theme: {msg}"),
            Self::Classpath(msg) => write!(f, "classpath: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
