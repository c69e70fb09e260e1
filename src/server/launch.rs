//! Positional launch argument contract for the runner process.
//!
//! The runner reads its positional arguments by index, so the order built
//! here is a wire contract:
//!
//! | Position | Value                                                  |
//! |----------|--------------------------------------------------------|
//! | flags    | debug flags, hot-reload agent, extra JVM args, tmp dir |
//! | `-cp`    | classpath string (or the classpath jar)                |
//! | 0        | runner entry point                                     |
//! | 1        | port                                                   |
//! | 2        | web root, trailing separator                           |
//! | 3        | comma-joined class dirs, each with trailing separator  |
//! | 4        | resources dir, trailing separator                      |
//! | 5        | log level name                                         |
//! | 6        | project name                                           |
//! | 7        | absolute build directory                               |

use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::process::Stdio;

use tokio::process::Command;

use crate::config::SessionConfig;
use crate::server::ServerKind;

/// Separator the JVM expects between classpath entries.
#[cfg(windows)]
pub const CLASSPATH_SEPARATOR: &str = ";";
/// Separator the JVM expects between classpath entries.
#[cfg(not(windows))]
pub const CLASSPATH_SEPARATOR: &str = ":";

/// Flag enabling HotswapAgent; only DCEVM and JetBrains Runtime builds accept it.
const HOT_RELOAD_AGENT_FLAG: &str = "-XX:HotswapAgent=fatjar";

/// Ordered program and argument list used to spawn the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchDescriptor {
    /// Java launcher.
    pub program: String,
    /// Arguments in wire order.
    pub args: Vec<String>,
    /// Working directory of the spawned process.
    pub working_dir: PathBuf,
}

impl LaunchDescriptor {
    /// Build the launch descriptor for `kind` from the session configuration.
    ///
    /// `classpath` is the already-joined classpath string or the path of a
    /// classpath jar.
    #[must_use]
    pub fn build(config: &SessionConfig, kind: ServerKind, classpath: &str) -> Self {
        let server = &config.server;
        let build_dir = config.build_dir();
        let mut args = Vec::new();

        if server.debug {
            args.push("-Xdebug".to_owned());
            args.push(format!(
                "-Xrunjdwp:transport=dt_socket,server=y,suspend=n,address={}",
                server.debug_port
            ));
        }

        if server.hot_reload_agent {
            args.push(HOT_RELOAD_AGENT_FLAG.to_owned());
        }

        args.extend(server.jvm_args.iter().cloned());
        args.push(format!(
            "-Djava.io.tmpdir={}",
            build_dir.join("tmp").display()
        ));

        args.push("-cp".to_owned());
        args.push(classpath.to_owned());

        args.push(kind.runner_entry_point().to_owned());
        args.push(server.port.to_string());
        args.push(with_trailing_separator(&config.web_root()));
        args.push(
            config
                .class_dirs()
                .iter()
                .map(|dir| with_trailing_separator(dir))
                .collect::<Vec<_>>()
                .join(","),
        );
        args.push(with_trailing_separator(&config.resources_dir()));
        args.push(server.log_level.clone());
        args.push(config.project_name.clone());
        args.push(build_dir.display().to_string());

        Self {
            program: config.java_executable.clone(),
            args,
            working_dir: build_dir,
        }
    }

    /// Positional arguments consumed by the runner (everything after `-cp <classpath>`).
    #[must_use]
    pub fn runner_args(&self) -> &[String] {
        self.args
            .iter()
            .position(|arg| arg == "-cp")
            .and_then(|idx| self.args.get(idx + 2..))
            .unwrap_or(&[])
    }

    /// Create a piped, `kill_on_drop` command ready to spawn.
    #[must_use]
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Render `path` with exactly one trailing path separator.
#[must_use]
pub fn with_trailing_separator(path: &Path) -> String {
    let mut rendered = path.display().to_string();
    if !rendered.ends_with(MAIN_SEPARATOR) {
        rendered.push(MAIN_SEPARATOR);
    }
    rendered
}
