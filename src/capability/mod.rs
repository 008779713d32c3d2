// src/capability/mod.rs

//! Transformation capabilities.
//!
//! A capability turns one entry file into one or more output artifacts. The
//! task layer decides *which* entries to feed it and *where* the artifacts
//! land; the capability only knows how to transform bytes.
//!
//! - [`markup`]: minijinja templates with JSON data, minified.
//! - [`styles`]: grass SCSS compile, then lightningcss lowering and minify.
//! - [`scripts`]: [`bundle`] linking, then oxc minify.
//! - [`images`]: PNG/JPEG re-encode, keeping the smaller result.
//! - [`copy`]: verbatim copy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::model::{BuildSection, TaskKind};
use crate::config::paths::PathConfig;
use crate::errors::{Result, SitepipeError, TransformError};
use crate::types::ArtifactKind;

pub mod bundle;
pub mod copy;
pub mod imports;
pub mod images;
pub mod markup;
pub mod minify;
pub mod scripts;
pub mod sourcemap;
pub mod styles;

pub use copy::CopyTransform;
pub use images::ImageTransform;
pub use markup::MarkupTransform;
pub use scripts::ScriptTransform;
pub use styles::StyleTransform;

/// A file produced for one entry, relative to the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            bytes: bytes.into(),
        }
    }
}

/// A black-box transformation from an entry file to output artifacts.
///
/// Implementations must be pure with respect to the filesystem outside of
/// reading their inputs: all writes go through the returned artifacts.
pub trait Transform: Send + Sync {
    fn kind(&self) -> ArtifactKind;

    /// Relative output path of the primary artifact for an entry, given the
    /// entry's path relative to the task base (after renaming).
    ///
    /// Defaults to the same path.
    fn output_name(&self, rel: &Path) -> PathBuf {
        rel.to_path_buf()
    }

    /// Files the entry reads besides itself (absolute paths), one level
    /// deep. `None` means the capability cannot tell.
    fn dependencies(&self, _entry: &Path) -> Option<Vec<PathBuf>> {
        Some(Vec::new())
    }

    /// Transform `entry` (absolute path) into artifacts. `output` is the
    /// relative path of the primary artifact.
    fn transform(&self, entry: &Path, output: &Path) -> std::result::Result<Vec<Artifact>, TransformError>;
}

/// Build the default capability for a task kind.
pub fn build_transform(
    kind: TaskKind,
    paths: &Arc<PathConfig>,
    build: &BuildSection,
) -> Result<Arc<dyn Transform>> {
    let transform: Arc<dyn Transform> = match kind {
        TaskKind::Markup => Arc::new(
            MarkupTransform::new(paths.views(), paths.data())
                .with_inline_images(paths.assets().join("images"), paths.output().join("images")),
        ),
        TaskKind::Styles => {
            let targets = styles::parse_browser_targets(&build.browser_targets)
                .map_err(|msg| SitepipeError::ConfigError(format!("[build].browser_targets: {msg}")))?;
            Arc::new(StyleTransform::new(targets, build.source_maps))
        }
        TaskKind::Scripts => Arc::new(ScriptTransform::new(build.source_maps)),
        TaskKind::Images => Arc::new(ImageTransform),
        TaskKind::Copy => Arc::new(CopyTransform),
    };
    Ok(transform)
}

pub(crate) fn read_source(path: &Path) -> std::result::Result<String, TransformError> {
    std::fs::read_to_string(path).map_err(|e| TransformError::io(path, e))
}
