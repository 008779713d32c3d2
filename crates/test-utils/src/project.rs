#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use sitepipe::capability::Transform;
use sitepipe::config::{PathConfig, PathsSection};
use sitepipe::task::TransformTask;
use sitepipe::watch::TaskPatterns;

/// A throwaway project: `<tmp>/src` as source root, `<tmp>/build` as output.
pub struct TempProject {
    dir: TempDir,
}

impl TempProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        fs::create_dir_all(dir.path().join("src")).expect("create source root");
        Self { dir }
    }

    /// Canonical project root (watch events and resolved paths use it).
    pub fn root(&self) -> PathBuf {
        self.dir.path().canonicalize().expect("canonical temp dir")
    }

    pub fn source(&self) -> PathBuf {
        self.root().join("src")
    }

    pub fn output(&self) -> PathBuf {
        self.root().join("build")
    }

    /// Absolute path of `rel` under the source root.
    pub fn src(&self, rel: &str) -> PathBuf {
        self.source().join(rel)
    }

    /// Absolute path of `rel` under the output root.
    pub fn out(&self, rel: &str) -> PathBuf {
        self.output().join(rel)
    }

    /// Write a file under the source root, creating parent directories.
    pub fn write(&self, rel: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.src(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write source file");
        path
    }

    /// Write a file relative to the project root (e.g. `Sitepipe.toml`).
    pub fn write_root(&self, rel: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write project file");
        path
    }

    pub fn remove(&self, rel: &str) -> PathBuf {
        let path = self.src(rel);
        fs::remove_file(&path).expect("remove source file");
        path
    }

    pub fn read_output(&self, rel: &str) -> String {
        fs::read_to_string(self.out(rel))
            .unwrap_or_else(|e| panic!("read output {rel}: {e}"))
    }

    pub fn read_output_bytes(&self, rel: &str) -> Vec<u8> {
        fs::read(self.out(rel)).unwrap_or_else(|e| panic!("read output {rel}: {e}"))
    }

    pub fn output_exists(&self, rel: &str) -> bool {
        self.out(rel).exists()
    }

    /// Paths resolved with the default `[paths]` section.
    pub fn paths(&self) -> Arc<PathConfig> {
        Arc::new(
            PathConfig::resolve(&self.root(), &PathsSection::default())
                .expect("resolve project paths"),
        )
    }

    /// A task over `input` (relative to the source root) driven by
    /// `transform`, with no `watch` patterns.
    pub fn task(&self, name: &str, input: &str, transform: Arc<dyn Transform>) -> TransformTask {
        let patterns = TaskPatterns::new(&[input.to_string()], None, &[], "_")
            .expect("valid test patterns");
        TransformTask::new(name, patterns, transform, self.paths())
    }

    /// Like [`TempProject::task`] with explicit `watch` patterns.
    pub fn watching_task(
        &self,
        name: &str,
        input: &str,
        watch: &[&str],
        transform: Arc<dyn Transform>,
    ) -> TransformTask {
        let watch: Vec<String> = watch.iter().map(|s| s.to_string()).collect();
        let patterns = TaskPatterns::new(&[input.to_string()], Some(&watch), &[], "_")
            .expect("valid test patterns");
        TransformTask::new(name, patterns, transform, self.paths())
    }
}

impl Default for TempProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Absolute path helper for assertions.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
