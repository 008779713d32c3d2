// src/capability/scripts.rs

use std::path::{Path, PathBuf};

use crate::capability::bundle::{bundle_entry, scan_script_imports};
use crate::capability::minify::minify_js;
use crate::capability::sourcemap::{mapping_url_comment, source_map_artifact};
use crate::capability::{read_source, Artifact, Transform};
use crate::errors::TransformError;
use crate::types::ArtifactKind;

/// Links a script entry with its imports and minifies it with oxc.
/// `app.js` becomes `app.min.js`.
///
/// Source maps point into the linked bundle, embedded in the map as
/// `app.bundle.js`.
#[derive(Debug, Clone)]
pub struct ScriptTransform {
    source_maps: bool,
}

impl ScriptTransform {
    pub fn new(source_maps: bool) -> Self {
        Self { source_maps }
    }
}

impl Transform for ScriptTransform {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Script
    }

    fn output_name(&self, rel: &Path) -> PathBuf {
        rel.with_extension("min.js")
    }

    fn dependencies(&self, entry: &Path) -> Option<Vec<PathBuf>> {
        let source = read_source(entry).ok()?;
        Some(scan_script_imports(entry, &source))
    }

    fn transform(&self, entry: &Path, output: &Path) -> Result<Vec<Artifact>, TransformError> {
        let bundle = bundle_entry(entry)?;

        let source_name = entry
            .with_extension("bundle.js")
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let minified = minify_js(&bundle.code, self.source_maps.then_some(source_name.as_str()))
            .map_err(|msg| TransformError::render(entry, msg))?;

        let mut code = minified.code;
        let mut artifacts = Vec::with_capacity(2);
        if let Some(map) = minified.map {
            code.push_str(&mapping_url_comment(output, false));
            artifacts.push(source_map_artifact(output, &map, &bundle.code)?);
        }
        artifacts.insert(0, Artifact::new(output, code));

        Ok(artifacts)
    }
}
