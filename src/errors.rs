// src/errors.rs

//! Crate-wide error types.
//!
//! - [`SitepipeError`] covers fatal, startup-time failures (bad config,
//!   cyclic task graph, unresolvable paths). They are reported before any
//!   task runs.
//! - [`TransformError`] covers per-entry failures inside a task. They never
//!   cross task boundaries; the task converts them into an [`ErrorDetail`]
//!   carried by its `BuildResult`.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SitepipeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SitepipeError {
    /// Configuration errors are fatal and only ever raised at startup.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SitepipeError::ConfigError(_)
                | SitepipeError::DagCycle(_)
                | SitepipeError::TaskNotFound(_)
                | SitepipeError::TomlError(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SitepipeError>;

/// Failure of a capability on a single entry file.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {message}", path.display())]
    Render { path: PathBuf, message: String },

    #[error("{}: malformed JSON context: {source}", path.display())]
    Data {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl TransformError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        TransformError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn render(path: impl AsRef<Path>, message: impl fmt::Display) -> Self {
        TransformError::Render {
            path: path.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            TransformError::Io { path, .. }
            | TransformError::Render { path, .. }
            | TransformError::Data { path, .. } => path,
        }
    }
}

/// Category of a per-task failure, as carried by a `BuildResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Io,
    Render,
    Data,
    /// An upstream task failed in the same run.
    Blocked,
    /// The capability panicked.
    Panic,
}

/// Cloneable description of why a task invocation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
    pub path: Option<PathBuf>,
    /// Number of entries that failed in this invocation.
    pub failed_entries: usize,
}

impl ErrorDetail {
    pub fn blocked(upstream: &str) -> Self {
        Self {
            kind: ErrorKind::Blocked,
            message: format!("skipped because upstream task '{upstream}' failed"),
            path: None,
            failed_entries: 0,
        }
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Panic,
            message: message.into(),
            path: None,
            failed_entries: 0,
        }
    }

    /// Summarize the entry errors of one invocation; the first error is kept
    /// as the headline.
    pub fn from_entry_errors(errors: &[TransformError]) -> Option<Self> {
        let first = errors.first()?;
        let kind = match first {
            TransformError::Io { .. } => ErrorKind::Io,
            TransformError::Render { .. } => ErrorKind::Render,
            TransformError::Data { .. } => ErrorKind::Data,
        };
        Some(Self {
            kind,
            message: first.to_string(),
            path: Some(first.path().to_path_buf()),
            failed_entries: errors.len(),
        })
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if self.failed_entries > 1 {
            write!(f, " (and {} more)", self.failed_entries - 1)?;
        }
        Ok(())
    }
}
