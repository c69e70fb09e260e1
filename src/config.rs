//! Development-session configuration parsing and validation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Settings for the spawned application server.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Server kind name; resolved by [`crate::server::ServerKind::from_name`].
    #[serde(default = "default_server_kind")]
    pub kind: String,
    /// HTTP port the server listens on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Extra JVM arguments placed after the debug flags.
    #[serde(default)]
    pub jvm_args: Vec<String>,
    /// Attach a remote debugger agent to the server JVM.
    #[serde(default)]
    pub debug: bool,
    /// Port the debugger agent listens on.
    #[serde(default = "default_debug_port")]
    pub debug_port: u16,
    /// Log level name handed to the runner.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Enable the JVM hot-reload agent.
    #[serde(default)]
    pub hot_reload_agent: bool,
    /// Pack the classpath into a single manifest jar.
    #[serde(default)]
    pub use_classpath_jar: bool,
    /// How long the process must survive after spawn to count as started.
    #[serde(default = "default_startup_probe_millis")]
    pub startup_probe_millis: u64,
    /// Grace period between the polite stop request and a hard kill.
    #[serde(default = "default_terminate_grace_millis")]
    pub terminate_grace_millis: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            kind: default_server_kind(),
            port: default_port(),
            jvm_args: Vec::new(),
            debug: false,
            debug_port: default_debug_port(),
            log_level: default_log_level(),
            hot_reload_agent: false,
            use_classpath_jar: false,
            startup_probe_millis: default_startup_probe_millis(),
            terminate_grace_millis: default_terminate_grace_millis(),
        }
    }
}

impl ServerConfig {
    /// Startup liveness probe window.
    #[must_use]
    pub fn startup_probe(&self) -> Duration {
        Duration::from_millis(self.startup_probe_millis)
    }

    /// Grace period granted to the server before a hard kill.
    #[must_use]
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_millis)
    }
}

/// Developer-loop behaviour: watching, browser, console echo.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DevConfig {
    /// Recompile the theme when a stylesheet changes.
    #[serde(default)]
    pub theme_auto_recompile: bool,
    /// Compress the theme after each recompilation.
    #[serde(default)]
    pub theme_compress: bool,
    /// Open the browser once the server is ready.
    #[serde(default)]
    pub open_in_browser: bool,
    /// Echo server output to the console.
    #[serde(default = "default_true")]
    pub log_to_console: bool,
    /// Quiet window applied to every watched directory.
    #[serde(default = "default_debounce_millis")]
    pub debounce_millis: u64,
    /// Extra query parameters appended to the browser URL.
    #[serde(default)]
    pub browser_params: BTreeMap<String, String>,
    /// Command (program + args) that compiles the theme.
    #[serde(default)]
    pub theme_compile_command: Vec<String>,
    /// Command (program + args) that compresses the compiled theme.
    #[serde(default)]
    pub theme_compress_command: Vec<String>,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            theme_auto_recompile: false,
            theme_compress: false,
            open_in_browser: false,
            log_to_console: true,
            debounce_millis: default_debounce_millis(),
            browser_params: BTreeMap::new(),
            theme_compile_command: Vec::new(),
            theme_compress_command: Vec::new(),
        }
    }
}

impl DevConfig {
    /// Quiet window applied by each debouncer.
    #[must_use]
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_millis)
    }
}

fn default_true() -> bool {
    true
}

fn default_server_kind() -> String {
    "jetty".into()
}

fn default_port() -> u16 {
    8080
}

fn default_debug_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "INFO".into()
}

fn default_startup_probe_millis() -> u64 {
    200
}

fn default_terminate_grace_millis() -> u64 {
    5000
}

fn default_debounce_millis() -> u64 {
    1000
}

fn default_java_executable() -> String {
    "java".into()
}

/// Top-level session configuration parsed from `devrun.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Project name handed to the runner.
    pub project_name: String,
    /// Project root; relative paths below are resolved against it.
    pub project_dir: PathBuf,
    /// Build output directory (working directory of the server process).
    #[serde(default)]
    pub build_dir: Option<PathBuf>,
    /// Web application root.
    #[serde(default)]
    pub web_root: Option<PathBuf>,
    /// Resources directory.
    #[serde(default)]
    pub resources_dir: Option<PathBuf>,
    /// Compiled class output directories.
    #[serde(default)]
    pub class_dirs: Vec<PathBuf>,
    /// Single class output directory replacing `class_dirs` when set.
    #[serde(default)]
    pub class_output_override: Option<PathBuf>,
    /// Theme root directory watched for stylesheet changes.
    #[serde(default)]
    pub theme_dir: Option<PathBuf>,
    /// Resolved dependency jars forming the runtime classpath.
    #[serde(default)]
    pub classpath: Vec<PathBuf>,
    /// Java launcher used to spawn the runner.
    #[serde(default = "default_java_executable")]
    pub java_executable: String,
    /// Server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Developer-loop settings.
    #[serde(default)]
    pub dev: DevConfig,
}

impl SessionConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Build output directory.
    #[must_use]
    pub fn build_dir(&self) -> PathBuf {
        self.resolve(self.build_dir.as_deref(), "build")
    }

    /// Web application root.
    #[must_use]
    pub fn web_root(&self) -> PathBuf {
        self.resolve(self.web_root.as_deref(), "src/main/webapp")
    }

    /// Resources directory.
    #[must_use]
    pub fn resources_dir(&self) -> PathBuf {
        self.resolve(self.resources_dir.as_deref(), "src/main/resources")
    }

    /// Effective class output directories, honouring the override.
    #[must_use]
    pub fn class_dirs(&self) -> Vec<PathBuf> {
        if let Some(ref dir) = self.class_output_override {
            return vec![self.project_dir.join(dir)];
        }
        if self.class_dirs.is_empty() {
            return vec![self.build_dir().join("classes")];
        }
        self.class_dirs
            .iter()
            .map(|dir| self.project_dir.join(dir))
            .collect()
    }

    /// Theme root, if one is configured.
    #[must_use]
    pub fn theme_dir(&self) -> Option<PathBuf> {
        self.theme_dir.as_ref().map(|dir| self.project_dir.join(dir))
    }

    /// Classpath jars resolved against the project directory.
    #[must_use]
    pub fn classpath(&self) -> Vec<PathBuf> {
        self.classpath
            .iter()
            .map(|jar| self.project_dir.join(jar))
            .collect()
    }

    /// Per-server log file location.
    #[must_use]
    pub fn server_log_path(&self, server_name: &str) -> PathBuf {
        self.build_dir()
            .join("logs")
            .join(format!("{server_name}.log"))
    }

    fn resolve(&self, configured: Option<&Path>, fallback: &str) -> PathBuf {
        configured.map_or_else(
            || self.project_dir.join(fallback),
            |path| self.project_dir.join(path),
        )
    }

    fn validate(&mut self) -> Result<()> {
        if self.project_name.trim().is_empty() {
            return Err(AppError::Config("project_name must not be empty".into()));
        }

        if self.server.port == 0 {
            return Err(AppError::Config("server.port must be greater than zero".into()));
        }

        if self.server.debug && self.server.debug_port == 0 {
            return Err(AppError::Config(
                "server.debug_port must be greater than zero when debug is enabled".into(),
            ));
        }

        if self.dev.debounce_millis == 0 {
            return Err(AppError::Config(
                "dev.debounce_millis must be greater than zero".into(),
            ));
        }

        if self.dev.theme_auto_recompile && self.theme_dir.is_none() {
            return Err(AppError::Config(
                "dev.theme_auto_recompile requires theme_dir".into(),
            ));
        }

        let canonical_root = self
            .project_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("project_dir invalid: {err}")))?;
        self.project_dir = canonical_root;

        Ok(())
    }
}
