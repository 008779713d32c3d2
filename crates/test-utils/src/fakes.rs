#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sitepipe::capability::{Artifact, Transform};
use sitepipe::engine::Reloader;
use sitepipe::errors::{ErrorDetail, SitepipeError, TransformError};
use sitepipe::sink::ErrorSink;
use sitepipe::types::{ArtifactKind, BuildResult};

/// One call of a [`FakeTransform`].
#[derive(Debug, Clone)]
pub struct Invocation {
    pub label: String,
    pub entry: PathBuf,
    pub started: Instant,
    pub finished: Instant,
}

/// Shared, ordered record of fake transform calls across tasks.
#[derive(Debug, Clone, Default)]
pub struct InvocationLog {
    inner: Arc<Mutex<Vec<Invocation>>>,
}

impl InvocationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Invocation> {
        self.inner.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    /// Invocations recorded under `label`.
    pub fn for_label(&self, label: &str) -> Vec<Invocation> {
        self.all().into_iter().filter(|i| i.label == label).collect()
    }

    /// Entry file names invoked under `label`, sorted.
    pub fn entries_for(&self, label: &str) -> BTreeSet<String> {
        self.for_label(label)
            .iter()
            .filter_map(|i| i.entry.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect()
    }

    fn push(&self, invocation: Invocation) {
        self.inner.lock().unwrap().push(invocation);
    }
}

/// Transform that copies its input, recording every call.
///
/// It can be told to fail or panic on given entry file names, to sleep, and
/// to report a fixed dependency map.
#[derive(Debug, Clone)]
pub struct FakeTransform {
    label: String,
    kind: ArtifactKind,
    log: InvocationLog,
    fail_on: BTreeSet<String>,
    panic_on: BTreeSet<String>,
    delay: Duration,
    deps: Option<BTreeMap<PathBuf, Vec<PathBuf>>>,
    extension: Option<String>,
}

impl FakeTransform {
    pub fn new(label: &str, log: &InvocationLog) -> Self {
        Self {
            label: label.to_string(),
            kind: ArtifactKind::Static,
            log: log.clone(),
            fail_on: BTreeSet::new(),
            panic_on: BTreeSet::new(),
            delay: Duration::ZERO,
            deps: Some(BTreeMap::new()),
            extension: None,
        }
    }

    pub fn kind(mut self, kind: ArtifactKind) -> Self {
        self.kind = kind;
        self
    }

    /// Fail on every entry.
    pub fn failing(mut self) -> Self {
        self.fail_on.insert("*".to_string());
        self
    }

    pub fn fail_on(mut self, file_name: &str) -> Self {
        self.fail_on.insert(file_name.to_string());
        self
    }

    pub fn panic_on(mut self, file_name: &str) -> Self {
        self.panic_on.insert(file_name.to_string());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Declare that `entry` reads `dep` (absolute paths).
    pub fn depends(mut self, entry: impl Into<PathBuf>, dep: impl Into<PathBuf>) -> Self {
        self.deps
            .get_or_insert_with(BTreeMap::new)
            .entry(entry.into())
            .or_default()
            .push(dep.into());
        self
    }

    /// Report that dependencies are unknown.
    pub fn opaque_dependencies(mut self) -> Self {
        self.deps = None;
        self
    }

    /// Replace the output extension.
    pub fn output_extension(mut self, ext: &str) -> Self {
        self.extension = Some(ext.to_string());
        self
    }

    pub fn into_arc(self) -> Arc<dyn Transform> {
        Arc::new(self)
    }
}

impl Transform for FakeTransform {
    fn kind(&self) -> ArtifactKind {
        self.kind
    }

    fn output_name(&self, rel: &Path) -> PathBuf {
        match &self.extension {
            Some(ext) => rel.with_extension(ext),
            None => rel.to_path_buf(),
        }
    }

    fn dependencies(&self, entry: &Path) -> Option<Vec<PathBuf>> {
        let deps = self.deps.as_ref()?;
        Some(deps.get(entry).cloned().unwrap_or_default())
    }

    fn transform(&self, entry: &Path, output: &Path) -> Result<Vec<Artifact>, TransformError> {
        let started = Instant::now();
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let file_name = entry
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let bytes = std::fs::read(entry);

        self.log.push(Invocation {
            label: self.label.clone(),
            entry: entry.to_path_buf(),
            started,
            finished: Instant::now(),
        });

        if self.panic_on.contains(&file_name) {
            panic!("fake transform panicked on {file_name}");
        }
        if self.fail_on.contains("*") || self.fail_on.contains(&file_name) {
            return Err(TransformError::render(entry, "fake transform failure"));
        }

        let bytes = bytes.map_err(|e| TransformError::io(entry, e))?;
        Ok(vec![Artifact::new(output, bytes)])
    }
}

/// Error sink that keeps everything it is given.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    reports: Arc<Mutex<Vec<(String, ErrorDetail)>>>,
    fatals: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(String, ErrorDetail)> {
        self.reports.lock().unwrap().clone()
    }

    pub fn reported_tasks(&self) -> Vec<String> {
        self.reports().into_iter().map(|(task, _)| task).collect()
    }

    pub fn fatals(&self) -> Vec<String> {
        self.fatals.lock().unwrap().clone()
    }
}

impl ErrorSink for RecordingSink {
    fn report(&self, task: &str, detail: &ErrorDetail) {
        self.reports
            .lock()
            .unwrap()
            .push((task.to_string(), detail.clone()));
    }

    fn report_fatal(&self, error: &SitepipeError) {
        self.fatals.lock().unwrap().push(error.to_string());
    }
}

/// Reloader that keeps every notification.
#[derive(Debug, Clone, Default)]
pub struct RecordingReloader {
    reloads: Arc<Mutex<Vec<BuildResult>>>,
    errors: Arc<Mutex<Vec<(String, ErrorDetail)>>>,
}

impl RecordingReloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reloads(&self) -> Vec<BuildResult> {
        self.reloads.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<(String, ErrorDetail)> {
        self.errors.lock().unwrap().clone()
    }
}

impl Reloader for RecordingReloader {
    fn notify_reload(&self, result: &BuildResult) {
        self.reloads.lock().unwrap().push(result.clone());
    }

    fn notify_error(&self, task: &str, detail: &ErrorDetail) {
        self.errors
            .lock()
            .unwrap()
            .push((task.to_string(), detail.clone()));
    }
}
