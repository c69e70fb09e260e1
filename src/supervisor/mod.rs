//! Server process supervision.
//!
//! [`ProcessSupervisor`] owns the shared [`ProcessSlot`], builds the launch
//! descriptor, spawns and probes the server, and starts the log monitor and
//! theme watch for each run. [`run_session`] is the blocking restart loop
//! layered on top.

pub mod process;
pub mod restart;

use std::fs;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::process::Child;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::SessionConfig;
use crate::monitor::{output_lines, BrowserTarget, LogMonitor, ServerLog};
use crate::server::{
    classpath, BrowserLaunchRequest, BrowserOpener, ClasspathJarBuilder, LaunchDescriptor,
    ServerKind, SystemBrowser,
};
use crate::theme::{CommandThemeCompiler, ThemeCompiler, ThemeRecompile};
use crate::watch::{LivenessGate, WatchAction, WatchGroup, WatchScheduler};
use crate::{AppError, Result};

pub use process::{ExitWatch, ProcessExit, ProcessSlot, ServerProcess};
pub use restart::run_session;

/// External collaborators the supervisor calls into.
pub struct Collaborators {
    /// Opens the browser once the server is ready.
    pub browser: Arc<dyn BrowserOpener>,
    /// Theme preprocessor; built from configuration when absent.
    pub theme_compiler: Option<Arc<dyn ThemeCompiler>>,
    /// Required when `server.use_classpath_jar` is enabled.
    pub classpath_jar_builder: Option<Arc<dyn ClasspathJarBuilder>>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            browser: Arc::new(SystemBrowser),
            theme_compiler: None,
            classpath_jar_builder: None,
        }
    }
}

/// Watch action that terminates the server so the restart loop relaunches it.
pub struct RestartServer {
    slot: Arc<ProcessSlot>,
}

impl RestartServer {
    /// Create the action for the process held in `slot`.
    #[must_use]
    pub fn new(slot: Arc<ProcessSlot>) -> Self {
        Self { slot }
    }
}

impl WatchAction for RestartServer {
    fn name(&self) -> &'static str {
        "classes"
    }

    fn run(&self) {
        if self.slot.terminate() {
            info!("compiled classes changed; restarting server");
        }
    }
}

/// Owns the server process for one development session.
pub struct ProcessSupervisor {
    config: Arc<SessionConfig>,
    kind: ServerKind,
    slot: Arc<ProcessSlot>,
    scheduler: WatchScheduler,
    browser: Arc<dyn BrowserOpener>,
    theme_compiler: Option<Arc<dyn ThemeCompiler>>,
    jar_builder: Option<Arc<dyn ClasspathJarBuilder>>,
    start_lock: tokio::sync::Mutex<()>,
    exit: Mutex<Option<ExitWatch>>,
    theme_watch: Mutex<Option<WatchGroup>>,
    class_watch: Mutex<Option<WatchGroup>>,
}

impl ProcessSupervisor {
    /// Create a supervisor; the server kind is fixed here.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an unknown server kind, a classpath jar
    /// request without a builder, or theme auto-recompile without a compile
    /// command.
    pub fn new(
        config: SessionConfig,
        collaborators: Collaborators,
        scheduler: WatchScheduler,
    ) -> Result<Self> {
        let kind = ServerKind::from_name(&config.server.kind)?;

        if config.server.use_classpath_jar && collaborators.classpath_jar_builder.is_none() {
            return Err(AppError::Config(
                "server.use_classpath_jar requires a classpath jar builder".into(),
            ));
        }

        let theme_compiler = match collaborators.theme_compiler {
            Some(compiler) => Some(compiler),
            None if config.dev.theme_auto_recompile => Some(Arc::new(
                CommandThemeCompiler::from_config(&config)?,
            ) as Arc<dyn ThemeCompiler>),
            None => None,
        };

        Ok(Self {
            config: Arc::new(config),
            kind,
            slot: Arc::new(ProcessSlot::new()),
            scheduler,
            browser: collaborators.browser,
            theme_compiler,
            jar_builder: collaborators.classpath_jar_builder,
            start_lock: tokio::sync::Mutex::new(()),
            exit: Mutex::new(None),
            theme_watch: Mutex::new(None),
            class_watch: Mutex::new(None),
        })
    }

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Server kind selected at construction.
    #[must_use]
    pub fn kind(&self) -> ServerKind {
        self.kind
    }

    /// Server name, e.g. `jetty`.
    #[must_use]
    pub fn server_name(&self) -> &'static str {
        self.kind.server_name()
    }

    /// Readiness token for this server kind.
    #[must_use]
    pub fn success_token(&self) -> &'static str {
        self.kind.success_token()
    }

    /// Runner main class for this server kind.
    #[must_use]
    pub fn runner_entry_point(&self) -> &'static str {
        self.kind.runner_entry_point()
    }

    /// Shared process slot, for actions that need to terminate the server.
    #[must_use]
    pub fn slot(&self) -> Arc<ProcessSlot> {
        Arc::clone(&self.slot)
    }

    /// Per-server log file path.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.config.server_log_path(self.server_name())
    }

    /// Whether a process handle is set (even if that process already exited).
    #[must_use]
    pub fn has_process(&self) -> bool {
        self.slot.is_present()
    }

    /// Whether the supervised process is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.slot.is_running()
    }

    /// Launch descriptor for the next start.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Classpath` if the classpath jar cannot be built.
    pub fn launch_descriptor(&self) -> Result<LaunchDescriptor> {
        let classpath = self.classpath_argument()?;
        Ok(LaunchDescriptor::build(&self.config, self.kind, &classpath))
    }

    fn classpath_argument(&self) -> Result<String> {
        let jars = self.config.classpath();
        match self.jar_builder {
            Some(ref builder) if self.config.server.use_classpath_jar => {
                let jar = builder.build_classpath_jar(&jars, &self.config.build_dir())?;
                Ok(jar.display().to_string())
            }
            _ => Ok(classpath::join_classpath(&jars)),
        }
    }

    /// Start the server.
    ///
    /// Returns `Ok(false)` without spawning when a process handle is already
    /// set. A process that dies within the startup probe window is fatal.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Startup` when the process cannot be spawned or dies
    /// immediately (the message carries the exit code), and `AppError::Io` /
    /// `AppError::Classpath` for launch preparation failures.
    pub async fn start(&self, stop_after_start: bool) -> Result<bool> {
        let _start = self.start_lock.lock().await;
        let span = info_span!(
            "start_server",
            server = self.server_name(),
            port = self.config.server.port
        );

        async {
            if self.slot.is_present() {
                warn!("server process already running; refusing to start another");
                return Ok(false);
            }

            let descriptor = self.launch_descriptor()?;
            fs::create_dir_all(&descriptor.working_dir).map_err(|err| {
                AppError::Io(format!(
                    "failed to create build directory {}: {err}",
                    descriptor.working_dir.display()
                ))
            })?;
            debug!(
                dependencies = ?self.kind.dependencies(),
                args = ?descriptor.args,
                "launching server runner"
            );

            let log = Arc::new(ServerLog::open(&self.log_path())?);
            let mut child = descriptor.command().spawn().map_err(|err| {
                AppError::Startup(format!(
                    "failed to spawn server process '{}': {err}",
                    descriptor.program
                ))
            })?;
            log.session_header(self.server_name(), child.id());

            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| AppError::Startup("failed to capture server stdout".into()))?;
            let stderr = child
                .stderr
                .take()
                .ok_or_else(|| AppError::Startup("failed to capture server stderr".into()))?;

            if let Some(status) =
                probe_early_exit(&mut child, self.config.server.startup_probe()).await?
            {
                let code = status.code().unwrap_or(-1);
                let message = format!("server process exited immediately with code {code}");
                error!(code, "{message}");
                log.status(&message);
                return Err(AppError::Startup(message));
            }

            let id = self.slot.next_id();
            let process = ServerProcess::adopt(id, child, self.config.server.terminate_grace());
            let pid = process.pid();
            let exit = process.exit_watch();
            if let Err(rejected) = self.slot.install(process) {
                rejected.destroy();
                return Ok(false);
            }
            *lock(&self.exit) = Some(exit);

            if let Err(err) = classpath::write_manifest(
                &self.config.build_dir(),
                &self.config.classpath(),
            ) {
                self.slot.terminate();
                return Err(err);
            }

            self.spawn_monitor(id, stop_after_start, &log, output_lines(stdout, stderr));

            if self.config.dev.theme_auto_recompile {
                if let Err(err) = self.watch_theme() {
                    self.slot.terminate();
                    return Err(err);
                }
            }

            info!(?pid, id, "server process started");
            Ok::<_, AppError>(true)
        }
        .instrument(span)
        .await
    }

    fn spawn_monitor(
        &self,
        id: u64,
        stop_after_start: bool,
        log: &Arc<ServerLog>,
        lines: crate::monitor::OutputLines,
    ) {
        let browser = self.config.dev.open_in_browser.then(|| BrowserTarget {
            opener: Arc::clone(&self.browser),
            request: BrowserLaunchRequest::new(
                self.config.server.port,
                self.config.server.debug,
                self.config.dev.browser_params.clone(),
            ),
        });

        let monitor = LogMonitor::new(
            id,
            self.kind,
            self.config.server.port,
            stop_after_start,
            self.config.dev.log_to_console,
            browser,
            Arc::clone(&self.slot),
            Arc::clone(log),
        );

        let cancel = self.scheduler.token();
        self.scheduler.spawn(
            async move {
                let outcome = monitor.run(lines, cancel).await;
                debug!(?outcome, "log monitor finished");
            }
            .instrument(info_span!("log_monitor", process_id = id)),
        );
    }

    /// (Re)install the theme subscription, replacing any previous one.
    fn watch_theme(&self) -> Result<()> {
        let (Some(dir), Some(compiler)) = (self.config.theme_dir(), self.theme_compiler.as_ref())
        else {
            return Ok(());
        };

        let action: Arc<dyn WatchAction> = Arc::new(ThemeRecompile::new(
            Arc::clone(compiler),
            self.config.dev.theme_compress,
        ));
        let gate: Arc<dyn LivenessGate> = Arc::clone(&self.slot) as Arc<dyn LivenessGate>;
        let group = WatchGroup::theme(
            &dir,
            self.config.dev.debounce_window(),
            action,
            gate,
            self.scheduler.clone(),
        )?;
        *lock(&self.theme_watch) = Some(group);
        Ok(())
    }

    /// Watch every existing class output directory with `action`.
    ///
    /// Each directory debounces independently. Returns the number of
    /// directories watched; a previous class watch is replaced.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Watch` if a directory cannot be watched.
    pub fn watch_class_dirs(&self, action: Arc<dyn WatchAction>) -> Result<usize> {
        let gate: Arc<dyn LivenessGate> = Arc::clone(&self.slot) as Arc<dyn LivenessGate>;
        let group = WatchGroup::class_dirs(
            &self.config.class_dirs(),
            self.config.dev.debounce_window(),
            &action,
            &gate,
            &self.scheduler,
        )?;
        let watched = group.len();
        *lock(&self.class_watch) = Some(group);
        Ok(watched)
    }

    /// Destroy the server process, if any. Idempotent.
    ///
    /// Returns `true` only for the call that actually destroyed a process.
    pub fn terminate(&self) -> bool {
        self.slot.terminate()
    }

    /// Wait for the most recently started process to exit.
    ///
    /// Returns `None` if no process was ever started.
    pub async fn wait_for_exit(&self) -> Option<ProcessExit> {
        let watch = lock(&self.exit).clone();
        match watch {
            Some(mut watch) => Some(watch.wait().await),
            None => None,
        }
    }

    /// Error describing a runtime failure, pointing at console or log file.
    #[must_use]
    pub fn runtime_failure(&self, exit: ProcessExit) -> AppError {
        let code = exit.code_or_signal();
        let location = if self.config.dev.log_to_console {
            "console output".to_owned()
        } else {
            self.log_path().display().to_string()
        };
        AppError::ServerExit(format!(
            "{} exited with code {code}; see {location} for details",
            self.server_name()
        ))
    }

    /// Terminate the server, drop all watches, and stop scheduled work.
    pub async fn shutdown(&self) {
        self.terminate();
        lock(&self.theme_watch).take();
        lock(&self.class_watch).take();
        self.scheduler.shutdown().await;
        info!(server = self.server_name(), "supervisor shut down");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Return the exit status if the child dies within `window`.
async fn probe_early_exit(child: &mut Child, window: Duration) -> Result<Option<ExitStatus>> {
    if window.is_zero() {
        return child
            .try_wait()
            .map_err(|err| AppError::Startup(format!("failed to check server liveness: {err}")));
    }
    match tokio::time::timeout(window, child.wait()).await {
        Ok(Ok(status)) => Ok(Some(status)),
        Ok(Err(err)) => Err(AppError::Startup(format!(
            "failed to check server liveness: {err}"
        ))),
        Err(_alive) => Ok(None),
    }
}
