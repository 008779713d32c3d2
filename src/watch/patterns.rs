// src/watch/patterns.rs

use std::fmt;

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::config::model::TaskConfig;

/// How a task relates to a path under the source root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRole {
    /// Not watched by the task (or excluded).
    Ignored,
    /// A non-private input file: rebuilt on its own.
    Entry,
    /// Watched but not an entry (partials, data files): rebuilds the entries
    /// that read it.
    Dependency,
}

/// Compiled input/watch/exclude glob patterns for a single task.
///
/// The patterns are relative to the source root; callers pass relative
/// paths with `/` separators (e.g. `"assets/sass/main.scss"`).
#[derive(Clone)]
pub struct TaskPatterns {
    input_set: GlobSet,
    /// Explicit watch patterns. Without them only entries trigger the task.
    watch_set: Option<GlobSet>,
    exclude_set: Option<GlobSet>,
    private_prefix: String,
}

impl fmt::Debug for TaskPatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPatterns")
            .field("private_prefix", &self.private_prefix)
            .finish_non_exhaustive()
    }
}

impl TaskPatterns {
    pub fn new(
        input: &[String],
        watch: Option<&[String]>,
        exclude: &[String],
        private_prefix: impl Into<String>,
    ) -> Result<Self> {
        let input_set = build_globset(input).context("building input globset")?;
        let watch_set = match watch {
            Some(patterns) => Some(build_globset(patterns).context("building watch globset")?),
            None => None,
        };
        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };

        Ok(Self {
            input_set,
            watch_set,
            exclude_set,
            private_prefix: private_prefix.into(),
        })
    }

    pub fn from_task_config(task: &TaskConfig, private_prefix: &str) -> Result<Self> {
        Self::new(
            &task.input,
            task.watch.as_deref(),
            &task.exclude,
            private_prefix,
        )
    }

    fn is_excluded(&self, rel_path: &str) -> bool {
        self.exclude_set
            .as_ref()
            .is_some_and(|set| set.is_match(rel_path))
    }

    /// Files whose name starts with the private prefix are never entries.
    pub fn is_private(&self, rel_path: &str) -> bool {
        let file_name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        file_name.starts_with(&self.private_prefix)
    }

    /// True if `rel_path` is an entry of this task.
    pub fn is_entry(&self, rel_path: &str) -> bool {
        self.input_set.is_match(rel_path)
            && !self.is_excluded(rel_path)
            && !self.is_private(rel_path)
    }

    /// True if a change to `rel_path` concerns this task at all.
    pub fn responds_to(&self, rel_path: &str) -> bool {
        if self.is_excluded(rel_path) {
            return false;
        }
        self.is_entry(rel_path)
            || self
                .watch_set
                .as_ref()
                .is_some_and(|set| set.is_match(rel_path))
    }

    pub fn classify(&self, rel_path: &str) -> PathRole {
        if self.is_entry(rel_path) {
            PathRole::Entry
        } else if self.responds_to(rel_path) {
            PathRole::Dependency
        } else {
            PathRole::Ignored
        }
    }
}

/// Build a GlobSet from simple string patterns.
///
/// `*` stays within one path segment; `**` crosses directories.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = GlobBuilder::new(pat)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
