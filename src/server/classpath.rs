//! Classpath manifest and classpath-jar collaborator.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::server::launch::CLASSPATH_SEPARATOR;
use crate::{AppError, Result};

/// File name of the classpath manifest inside the build directory.
pub const MANIFEST_FILE: &str = "classpath.txt";

/// Separator between entries in the classpath manifest.
const MANIFEST_SEPARATOR: &str = ";";

/// Packs a classpath into a single manifest jar.
///
/// Used when `server.use_classpath_jar` is enabled so the launch command
/// stays short on platforms with command-line length limits.
pub trait ClasspathJarBuilder: Send + Sync {
    /// Build the classpath jar for `jars` inside `build_dir` and return its path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Classpath` if the jar cannot be written.
    fn build_classpath_jar(&self, jars: &[PathBuf], build_dir: &Path) -> Result<PathBuf>;
}

/// Join jar paths with the platform classpath separator.
#[must_use]
pub fn join_classpath(jars: &[PathBuf]) -> String {
    jars.iter()
        .map(|jar| jar.display().to_string())
        .collect::<Vec<_>>()
        .join(CLASSPATH_SEPARATOR)
}

/// Write `<build_dir>/classpath.txt` with the `;`-joined absolute jar paths.
///
/// The file is rewritten on every call.
///
/// # Errors
///
/// Returns `AppError::Classpath` if the build directory or file cannot be
/// written.
pub fn write_manifest(build_dir: &Path, jars: &[PathBuf]) -> Result<PathBuf> {
    fs::create_dir_all(build_dir).map_err(|err| {
        AppError::Classpath(format!(
            "failed to create build directory {}: {err}",
            build_dir.display()
        ))
    })?;

    let content = jars
        .iter()
        .map(|jar| absolute(jar).display().to_string())
        .collect::<Vec<_>>()
        .join(MANIFEST_SEPARATOR);

    let path = build_dir.join(MANIFEST_FILE);
    fs::write(&path, content).map_err(|err| {
        AppError::Classpath(format!(
            "failed to write classpath manifest {}: {err}",
            path.display()
        ))
    })?;

    debug!(path = %path.display(), entries = jars.len(), "classpath manifest written");
    Ok(path)
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_owned();
    }
    std::env::current_dir().map_or_else(|_| path.to_owned(), |cwd| cwd.join(path))
}
