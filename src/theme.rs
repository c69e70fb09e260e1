//! Theme preprocessing collaborator and the theme watch action.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::{info, info_span, warn};

use crate::config::SessionConfig;
use crate::watch::WatchAction;
use crate::{AppError, Result};

/// Stylesheet extension that triggers theme recompilation.
pub const STYLESHEET_EXTENSION: &str = "css";

/// External theme preprocessor.
pub trait ThemeCompiler: Send + Sync {
    /// Compile the theme sources.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Theme` if compilation fails.
    fn compile_theme(&self) -> Result<()>;

    /// Compress the compiled stylesheet output.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Theme` if compression fails.
    fn compress_theme(&self) -> Result<()>;
}

/// Runs configured commands in the project directory.
#[derive(Debug, Clone)]
pub struct CommandThemeCompiler {
    project_dir: PathBuf,
    compile: Vec<String>,
    compress: Vec<String>,
}

impl CommandThemeCompiler {
    /// Build from `dev.theme_compile_command` / `dev.theme_compress_command`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if no compile command is configured.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        if config.dev.theme_compile_command.is_empty() {
            return Err(AppError::Config(
                "dev.theme_auto_recompile requires dev.theme_compile_command".into(),
            ));
        }
        Ok(Self {
            project_dir: config.project_dir.clone(),
            compile: config.dev.theme_compile_command.clone(),
            compress: config.dev.theme_compress_command.clone(),
        })
    }

    fn run(&self, label: &str, argv: &[String]) -> Result<()> {
        let Some((program, args)) = argv.split_first() else {
            return Err(AppError::Theme(format!("no {label} command configured")));
        };

        let status = Command::new(program)
            .args(args)
            .current_dir(&self.project_dir)
            .stdin(Stdio::null())
            .status()
            .map_err(|err| AppError::Theme(format!("failed to run {label} command: {err}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(AppError::Theme(format!(
                "{label} command failed with {}",
                status
                    .code()
                    .map_or_else(|| "a signal".to_owned(), |code| format!("code {code}"))
            )))
        }
    }
}

impl ThemeCompiler for CommandThemeCompiler {
    fn compile_theme(&self) -> Result<()> {
        self.run("theme compile", &self.compile)
    }

    fn compress_theme(&self) -> Result<()> {
        self.run("theme compress", &self.compress)
    }
}

/// Watch action: recompile the theme, then optionally compress it.
pub struct ThemeRecompile {
    compiler: Arc<dyn ThemeCompiler>,
    compress: bool,
}

impl ThemeRecompile {
    /// Create the action.
    #[must_use]
    pub fn new(compiler: Arc<dyn ThemeCompiler>, compress: bool) -> Self {
        Self { compiler, compress }
    }
}

impl WatchAction for ThemeRecompile {
    fn name(&self) -> &'static str {
        "theme"
    }

    fn run(&self) {
        let _span = info_span!("theme_recompile", compress = self.compress).entered();

        if let Err(err) = self.compiler.compile_theme() {
            warn!(%err, "theme recompilation failed");
            return;
        }
        info!("theme recompiled");

        if self.compress {
            match self.compiler.compress_theme() {
                Ok(()) => info!("theme compressed"),
                Err(err) => warn!(%err, "theme compression failed"),
            }
        }
    }
}
