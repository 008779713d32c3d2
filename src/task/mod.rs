// src/task/mod.rs

//! A named transform task: which files it reads, where it writes, and how a
//! change maps onto the entries to rebuild.

pub mod fresh;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::capability::imports::dependency_closure;
use crate::capability::sourcemap::map_path_for;
use crate::capability::{Artifact, Transform};
use crate::config::model::{BuildSection, TaskConfig};
use crate::config::paths::PathConfig;
use crate::engine::TaskName;
use crate::errors::{ErrorDetail, Result, SitepipeError, TransformError};
use crate::task::fresh::is_output_fresh;
use crate::types::{ArtifactKind, BuildResult, ChangeEvent, ChangeKind};
use crate::watch::patterns::{PathRole, TaskPatterns};

/// Entries to rebuild and entries whose outputs must go, for one
/// invocation of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPlan {
    pub rebuild: BTreeSet<PathBuf>,
    pub remove: BTreeSet<PathBuf>,
}

impl TaskPlan {
    pub fn rebuild_all(entries: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            rebuild: entries.into_iter().collect(),
            remove: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rebuild.is_empty() && self.remove.is_empty()
    }
}

/// What one entry produced.
#[derive(Debug, Default)]
struct EntryOutcome {
    written: Vec<PathBuf>,
    skipped: bool,
}

/// A named unit of work: reads the entries matching its patterns, feeds them
/// to its capability and writes the artifacts under the output root.
#[derive(Clone)]
pub struct TransformTask {
    name: TaskName,
    patterns: TaskPatterns,
    base: PathBuf,
    output_dir: PathBuf,
    depends_on: Vec<TaskName>,
    incremental: bool,
    use_hash: bool,
    rename: BTreeMap<String, String>,
    transform: Arc<dyn Transform>,
    paths: Arc<PathConfig>,
}

impl fmt::Debug for TransformTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformTask")
            .field("name", &self.name)
            .field("kind", &self.transform.kind())
            .field("base", &self.base)
            .field("output_dir", &self.output_dir)
            .field("depends_on", &self.depends_on)
            .field("incremental", &self.incremental)
            .finish_non_exhaustive()
    }
}

impl TransformTask {
    /// A task with no dependencies, based at the source root, writing to the
    /// output root.
    pub fn new(
        name: impl Into<TaskName>,
        patterns: TaskPatterns,
        transform: Arc<dyn Transform>,
        paths: Arc<PathConfig>,
    ) -> Self {
        Self {
            name: name.into(),
            patterns,
            base: paths.source().to_path_buf(),
            output_dir: PathBuf::new(),
            depends_on: Vec::new(),
            incremental: false,
            use_hash: false,
            rename: BTreeMap::new(),
            transform,
            paths,
        }
    }

    /// Build a task from its `[task.<name>]` section.
    pub fn from_config(
        name: &str,
        cfg: &TaskConfig,
        build: &BuildSection,
        transform: Arc<dyn Transform>,
        paths: Arc<PathConfig>,
    ) -> Result<Self> {
        let patterns = TaskPatterns::from_task_config(cfg, &build.private_prefix).map_err(|e| {
            SitepipeError::ConfigError(format!("task '{name}': {e:#}"))
        })?;

        let base = match &cfg.base {
            Some(base) => paths.source().join(base),
            None => paths.source().to_path_buf(),
        };

        Ok(Self::new(name, patterns, transform, paths)
            .with_base(base)
            .with_output_dir(&cfg.output)
            .with_depends_on(cfg.after.clone())
            .with_incremental(cfg.effective_incremental())
            .with_use_hash(cfg.effective_use_hash(build.use_hash.unwrap_or(false)))
            .with_rename(cfg.rename.clone()))
    }

    pub fn with_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = base.into();
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_depends_on(mut self, depends_on: Vec<TaskName>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn with_use_hash(mut self, use_hash: bool) -> Self {
        self.use_hash = use_hash;
        self
    }

    pub fn with_rename(mut self, rename: BTreeMap<String, String>) -> Self {
        self.rename = rename;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ArtifactKind {
        self.transform.kind()
    }

    pub fn depends_on(&self) -> &[TaskName] {
        &self.depends_on
    }

    pub fn uses_hash(&self) -> bool {
        self.use_hash
    }

    pub fn patterns(&self) -> &TaskPatterns {
        &self.patterns
    }

    /// All current entries, sorted.
    pub fn collect_entries(&self) -> Vec<PathBuf> {
        let source = self.paths.source();
        let mut entries: Vec<PathBuf> = WalkDir::new(source)
            .into_iter()
            .filter_map(|res| match res {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(task = %self.name, error = %e, "skipping unreadable path");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                self.paths
                    .source_relative(entry.path())
                    .is_some_and(|rel| self.patterns.is_entry(&rel))
            })
            .map(|entry| entry.into_path())
            .collect();
        entries.sort();
        entries
    }

    /// Relative path (under the output root) of an entry's primary artifact.
    pub fn output_path_for(&self, entry: &Path) -> PathBuf {
        let rel = entry
            .strip_prefix(&self.base)
            .or_else(|_| entry.strip_prefix(self.paths.source()))
            .unwrap_or(entry);

        let renamed = match rel.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => match self.rename.get(stem) {
                Some(new_stem) => {
                    let file_name = match rel.extension() {
                        Some(ext) => format!("{new_stem}.{}", ext.to_string_lossy()),
                        None => new_stem.clone(),
                    };
                    rel.with_file_name(file_name)
                }
                None => rel.to_path_buf(),
            },
            None => rel.to_path_buf(),
        };

        self.output_dir.join(self.transform.output_name(&renamed))
    }

    /// Work this task must do for a batch of changes, or `None` if no change
    /// concerns it.
    ///
    /// - An entry change rebuilds (or, when deleted, removes) that entry.
    /// - Any other watched path is a dependency trigger: it rebuilds every
    ///   entry whose dependency closure contains it. When the capability
    ///   cannot report dependencies, or the trigger was deleted, every
    ///   entry is rebuilt.
    pub fn plan_for_changes(&self, changes: &[ChangeEvent]) -> Option<TaskPlan> {
        let mut plan = TaskPlan::default();
        let mut triggers: Vec<&ChangeEvent> = Vec::new();

        for change in changes {
            let Some(rel) = self.paths.source_relative(&change.path) else {
                continue;
            };
            match self.patterns.classify(&rel) {
                PathRole::Ignored => {}
                PathRole::Entry => {
                    if change.kind == ChangeKind::Deleted {
                        plan.remove.insert(change.path.clone());
                    } else {
                        plan.rebuild.insert(change.path.clone());
                    }
                }
                PathRole::Dependency => triggers.push(change),
            }
        }

        if !triggers.is_empty() {
            let entries = self.collect_entries();
            let rebuild_everything = triggers.iter().any(|c| c.kind == ChangeKind::Deleted);

            for entry in entries {
                if plan.remove.contains(&entry) {
                    continue;
                }
                let affected = rebuild_everything
                    || match dependency_closure(self.transform.as_ref(), &entry) {
                        Some(closure) => triggers.iter().any(|c| closure.contains(&c.path)),
                        None => true,
                    };
                if affected {
                    plan.rebuild.insert(entry);
                }
            }
        }

        if plan.is_empty() {
            None
        } else {
            debug!(
                task = %self.name,
                rebuild = plan.rebuild.len(),
                remove = plan.remove.len(),
                "planned task invocation"
            );
            Some(plan)
        }
    }

    /// Plan covering every current entry.
    pub fn plan_all(&self) -> TaskPlan {
        TaskPlan::rebuild_all(self.collect_entries())
    }

    /// Transform `source_files` and write their artifacts.
    ///
    /// Entries are processed in parallel. A failing entry does not stop the
    /// others; the result is failed if any entry failed.
    pub fn execute(&self, source_files: &[PathBuf]) -> BuildResult {
        self.run_plan(&TaskPlan::rebuild_all(source_files.iter().cloned()))
    }

    /// Remove the outputs of deleted entries, then rebuild the rest.
    pub fn run_plan(&self, plan: &TaskPlan) -> BuildResult {
        let mut artifact_paths = Vec::new();
        let mut errors: Vec<TransformError> = Vec::new();

        for entry in &plan.remove {
            match self.remove_outputs(entry) {
                Ok(removed) => artifact_paths.extend(removed),
                Err(e) => errors.push(e),
            }
        }

        let entries: Vec<&PathBuf> = plan.rebuild.iter().collect();
        let outcomes: Vec<std::result::Result<EntryOutcome, TransformError>> = entries
            .par_iter()
            .map(|entry| self.process_entry(entry))
            .collect();

        let mut skipped = 0;
        for outcome in outcomes {
            match outcome {
                Ok(outcome) => {
                    if outcome.skipped {
                        skipped += 1;
                    }
                    artifact_paths.extend(outcome.written);
                }
                Err(e) => {
                    warn!(task = %self.name, error = %e, "entry failed");
                    errors.push(e);
                }
            }
        }

        let mut result = match ErrorDetail::from_entry_errors(&errors) {
            Some(detail) => BuildResult::failed(self.name.clone(), self.kind(), detail),
            None => BuildResult::succeeded(self.name.clone(), self.kind()),
        };
        result.artifact_paths = artifact_paths;
        result.skipped = skipped;

        info!(
            task = %self.name,
            success = result.success,
            entries = plan.rebuild.len(),
            removed = plan.remove.len(),
            skipped,
            failed = errors.len(),
            "task finished"
        );
        result
    }

    fn process_entry(&self, entry: &Path) -> std::result::Result<EntryOutcome, TransformError> {
        let output_rel = self.output_path_for(entry);
        let output_abs = self.paths.output().join(&output_rel);

        if self.incremental && is_output_fresh(entry, &output_abs) {
            debug!(task = %self.name, entry = %entry.display(), "output fresh; skipping");
            return Ok(EntryOutcome {
                written: Vec::new(),
                skipped: true,
            });
        }

        let artifacts = self.transform.transform(entry, &output_rel)?;
        let written = self.write_artifacts(&artifacts)?;
        debug!(
            task = %self.name,
            entry = %entry.display(),
            artifacts = written.len(),
            "entry transformed"
        );
        Ok(EntryOutcome {
            written,
            skipped: false,
        })
    }

    fn write_artifacts(&self, artifacts: &[Artifact]) -> std::result::Result<Vec<PathBuf>, TransformError> {
        let mut written = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let target = self.paths.output().join(&artifact.path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| TransformError::io(parent, e))?;
            }
            fs::write(&target, &artifact.bytes).map_err(|e| TransformError::io(&target, e))?;
            written.push(artifact.path.clone());
        }
        Ok(written)
    }

    /// Delete the primary output of `entry` and its source map, if present.
    fn remove_outputs(&self, entry: &Path) -> std::result::Result<Vec<PathBuf>, TransformError> {
        let primary = self.output_path_for(entry);
        let candidates = [map_path_for(&primary), primary];

        let mut removed = Vec::new();
        for rel in candidates {
            let target = self.paths.output().join(&rel);
            match fs::remove_file(&target) {
                Ok(()) => {
                    info!(task = %self.name, path = %rel.display(), "removed output of deleted entry");
                    removed.push(rel);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(TransformError::io(&target, e)),
            }
        }
        Ok(removed)
    }
}
