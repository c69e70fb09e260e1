//! Supported application server kinds.

use std::fmt::{Display, Formatter};

use crate::{AppError, Result};

/// Application server flavour launched by the supervisor.
///
/// Selected once per supervisor from the `server.kind` configuration value.
/// Each kind fixes its identity, readiness token, and runner entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerKind {
    /// Embedded Jetty runner.
    Jetty,
    /// Payara Micro runner.
    Payara,
}

impl ServerKind {
    /// Resolve a server kind from its configuration name (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for any name other than `jetty` or `payara`.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "jetty" => Ok(Self::Jetty),
            "payara" => Ok(Self::Payara),
            other => Err(AppError::Config(format!(
                "unknown server kind '{other}' (expected 'jetty' or 'payara')"
            ))),
        }
    }

    /// Short server name; also names the per-server log file.
    #[must_use]
    pub fn server_name(self) -> &'static str {
        match self {
            Self::Jetty => "jetty",
            Self::Payara => "payara",
        }
    }

    /// Output substring marking the server as ready to serve requests.
    #[must_use]
    pub fn success_token(self) -> &'static str {
        match self {
            Self::Jetty => "Started ServerConnector",
            Self::Payara => "Payara Micro URLs",
        }
    }

    /// Fully qualified main class of the runner spawned in the child JVM.
    #[must_use]
    pub fn runner_entry_point(self) -> &'static str {
        match self {
            Self::Jetty => "devrun.runner.JettyServerRunner",
            Self::Payara => "devrun.runner.PayaraServerRunner",
        }
    }

    /// Runner artifacts the host build must put on the classpath.
    #[must_use]
    pub fn dependencies(self) -> &'static [&'static str] {
        match self {
            Self::Jetty => &[
                "org.eclipse.jetty:jetty-server:9.4.53.v20231009",
                "org.eclipse.jetty:jetty-webapp:9.4.53.v20231009",
                "org.eclipse.jetty:jetty-annotations:9.4.53.v20231009",
                "org.eclipse.jetty.websocket:javax-websocket-server-impl:9.4.53.v20231009",
            ],
            Self::Payara => &["fish.payara.extras:payara-micro:5.2022.5"],
        }
    }
}

impl Display for ServerKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.server_name())
    }
}
