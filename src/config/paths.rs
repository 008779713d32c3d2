// src/config/paths.rs

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::config::model::PathsSection;
use crate::errors::{Result, SitepipeError};
use crate::watch::path_utils::relative_str;

/// Concrete locations of the project's logical roots.
///
/// Resolved once at startup and shared read-only (`Arc<PathConfig>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConfig {
    project: PathBuf,
    source: PathBuf,
    views: PathBuf,
    data: PathBuf,
    assets: PathBuf,
    output: PathBuf,
}

impl PathConfig {
    /// Resolve `[paths]` against `project_root`.
    ///
    /// Fails when the source root does not exist, when the output root
    /// would sit inside the source root (every write would retrigger the
    /// watcher) or when cleaning the output root would delete the sources.
    pub fn resolve(project_root: &Path, paths: &PathsSection) -> Result<Self> {
        let project = absolutize(project_root)?;
        let source = normalize(&project.join(&paths.source));
        let output = normalize(&project.join(&paths.output));

        if !source.is_dir() {
            return Err(SitepipeError::ConfigError(format!(
                "source root '{}' does not exist or is not a directory",
                source.display()
            )));
        }

        if output == source || output.starts_with(&source) {
            return Err(SitepipeError::ConfigError(format!(
                "output root '{}' must not be inside source root '{}'",
                output.display(),
                source.display()
            )));
        }

        if source.starts_with(&output) {
            return Err(SitepipeError::ConfigError(format!(
                "output root '{}' must not contain source root '{}'",
                output.display(),
                source.display()
            )));
        }

        let resolved = Self {
            views: normalize(&source.join(&paths.views)),
            data: normalize(&source.join(&paths.data)),
            assets: normalize(&source.join(&paths.assets)),
            project,
            source,
            output,
        };

        debug!(?resolved, "resolved project paths");
        Ok(resolved)
    }

    pub fn project(&self) -> &Path {
        &self.project
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn views(&self) -> &Path {
        &self.views
    }

    pub fn data(&self) -> &Path {
        &self.data
    }

    pub fn assets(&self) -> &Path {
        &self.assets
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// `path` relative to the source root, with `/` separators, or `None`
    /// when the path lies outside it.
    pub fn source_relative(&self, path: &Path) -> Option<String> {
        relative_str(&self.source, path)
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    // Watch events report canonical paths.
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        Ok(normalize(&std::env::current_dir()?.join(path)))
    }
}

/// Lexically remove `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
