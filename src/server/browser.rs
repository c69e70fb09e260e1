//! Browser URL construction and the browser-open collaborator.

use std::collections::BTreeMap;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::{AppError, Result};

/// A request to point the developer's browser at the running server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserLaunchRequest {
    /// Server port.
    pub port: u16,
    /// Prefix the query with the bare `debug` flag.
    pub debug: bool,
    /// Extra query parameters, joined in key order.
    pub params: BTreeMap<String, String>,
}

impl BrowserLaunchRequest {
    /// Create a request for `port`.
    #[must_use]
    pub fn new(port: u16, debug: bool, params: BTreeMap<String, String>) -> Self {
        Self {
            port,
            debug,
            params,
        }
    }

    /// Query string including the leading `?`, or empty when there is nothing to send.
    ///
    /// With `debug` on the query reads `?debug&k=v...`; otherwise `?k=v&...`.
    /// A trailing bare `?` or `&` is stripped.
    #[must_use]
    pub fn query(&self) -> String {
        let pairs = self
            .params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>();

        let mut query = String::from("?");
        if self.debug {
            query.push_str("debug");
            for pair in &pairs {
                query.push('&');
                query.push_str(pair);
            }
        } else {
            query.push_str(&pairs.join("&"));
        }

        while query.ends_with('?') || query.ends_with('&') {
            query.pop();
        }
        query
    }

    /// Full URL handed to the browser.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://localhost:{}/{}", self.port, self.query())
    }
}

/// Opens a URL in the developer's browser.
pub trait BrowserOpener: Send + Sync {
    /// Open `url`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the browser cannot be launched.
    fn open(&self, url: &str) -> Result<()>;
}

/// Opens URLs with the platform's default URL handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl SystemBrowser {
    /// Launcher program and arguments that open `url` on `target_os`.
    ///
    /// The URL is always one argument that no shell re-parses, so `&` in the
    /// query survives intact. Windows uses the `url.dll` protocol handler.
    #[must_use]
    pub fn launcher(target_os: &str, url: &str) -> (&'static str, Vec<String>) {
        match target_os {
            "windows" => (
                "rundll32",
                vec!["url.dll,FileProtocolHandler".to_owned(), url.to_owned()],
            ),
            "macos" => ("open", vec![url.to_owned()]),
            _ => ("xdg-open", vec![url.to_owned()]),
        }
    }
}

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        let (program, args) = Self::launcher(std::env::consts::OS, url);

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| AppError::Io(format!("failed to open browser with {program}: {err}")))?;

        // Reap the launcher off-thread; it usually exits immediately.
        std::thread::spawn(move || child.wait());

        debug!(url, program, "browser launch requested");
        Ok(())
    }
}
