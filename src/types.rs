use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::engine::TaskName;
use crate::errors::ErrorDetail;

/// Mode for storing content hashes used by the change filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashStorageMode {
    /// Store hashes in a file (`.sitepipe/hashes`).
    File,
    /// Store hashes in memory only (lost on restart).
    #[default]
    Memory,
}

/// What a task produces. Decides how connected browsers are refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Markup,
    Style,
    Script,
    Image,
    Static,
}

impl ArtifactKind {
    /// Stylesheets can be swapped in place; everything else needs a full
    /// page reload.
    pub fn is_hot_swappable(self) -> bool {
        matches!(self, ArtifactKind::Style)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub fn label(self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
        }
    }

    /// Combine a pending kind with a later one for the same path.
    ///
    /// - deleted, then created/modified: created (file was restored)
    /// - modified, then deleted: deleted
    /// - created, then deleted: `None` (the file never existed for us)
    /// - otherwise the pending kind wins
    pub fn merge(self, later: ChangeKind) -> Option<ChangeKind> {
        match (self, later) {
            (ChangeKind::Deleted, ChangeKind::Created | ChangeKind::Modified) => {
                Some(ChangeKind::Created)
            }
            (ChangeKind::Modified, ChangeKind::Deleted) => Some(ChangeKind::Deleted),
            (ChangeKind::Created, ChangeKind::Deleted) => None,
            (pending, _) => Some(pending),
        }
    }
}

/// A single debounced filesystem change. Consumed once by the task graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Absolute path of the changed file.
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub timestamp: SystemTime,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            timestamp: SystemTime::now(),
        }
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Modified)
    }
}

/// Outcome of one task invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    pub task_name: TaskName,
    pub kind: ArtifactKind,
    pub success: bool,
    pub error: Option<ErrorDetail>,
    /// Paths written (or removed, for deletions) under the output root.
    pub artifact_paths: Vec<PathBuf>,
    /// Entries skipped because their outputs were already fresh.
    pub skipped: usize,
}

impl BuildResult {
    pub fn succeeded(task_name: impl Into<TaskName>, kind: ArtifactKind) -> Self {
        Self {
            task_name: task_name.into(),
            kind,
            success: true,
            error: None,
            artifact_paths: Vec::new(),
            skipped: 0,
        }
    }

    pub fn failed(task_name: impl Into<TaskName>, kind: ArtifactKind, error: ErrorDetail) -> Self {
        Self {
            task_name: task_name.into(),
            kind,
            success: false,
            error: Some(error),
            artifact_paths: Vec::new(),
            skipped: 0,
        }
    }
}
