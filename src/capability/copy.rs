// src/capability/copy.rs

use std::path::Path;

use crate::capability::{Artifact, Transform};
use crate::errors::TransformError;
use crate::types::ArtifactKind;

/// Copies an entry verbatim (fonts, favicons, other static files).
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyTransform;

impl Transform for CopyTransform {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Static
    }

    fn transform(&self, entry: &Path, output: &Path) -> Result<Vec<Artifact>, TransformError> {
        let bytes = std::fs::read(entry).map_err(|e| TransformError::io(entry, e))?;
        Ok(vec![Artifact::new(output, bytes)])
    }
}
