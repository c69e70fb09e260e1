#![forbid(unsafe_code)]

pub mod config;
pub mod errors;
pub mod monitor;
pub mod server;
pub mod supervisor;
pub mod theme;
pub mod watch;

pub use config::SessionConfig;
pub use errors::{AppError, Result};
pub use supervisor::{run_session, ProcessSupervisor};
