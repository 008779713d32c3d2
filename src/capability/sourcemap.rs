// src/capability/sourcemap.rs

//! Source map siblings for minified styles and scripts.
//!
//! The maps come from the minifiers (lightningcss, oxc codegen). They point
//! into the intermediate source the minifier was given: the compiled CSS
//! of a stylesheet, or the linked bundle of a script.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::capability::Artifact;
use crate::errors::TransformError;

/// Directory (relative to the output root) holding all `.map` files.
pub const MAPS_DIR: &str = "maps";

/// `maps/<file name>.map` for a primary output path.
pub fn map_path_for(output: &Path) -> PathBuf {
    let file_name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Path::new(MAPS_DIR).join(format!("{file_name}.map"))
}

/// Build the map artifact for `output` from a minifier's map JSON.
///
/// Sets `file` to the output's file name and embeds `source_content` when
/// the minifier did not.
pub fn source_map_artifact(
    output: &Path,
    map_json: &str,
    source_content: &str,
) -> Result<Artifact, TransformError> {
    let mut map: Value =
        serde_json::from_str(map_json).map_err(|e| TransformError::render(output, e))?;
    let Some(fields) = map.as_object_mut() else {
        return Err(TransformError::render(output, "source map is not a JSON object"));
    };

    let file = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    fields.insert("file".to_string(), Value::String(file));

    let has_content = fields
        .get("sourcesContent")
        .and_then(Value::as_array)
        .is_some_and(|contents| contents.iter().any(Value::is_string));
    if !has_content {
        fields.insert(
            "sourcesContent".to_string(),
            Value::Array(vec![Value::String(source_content.to_string())]),
        );
    }

    let json = serde_json::to_vec(&map).map_err(|e| TransformError::render(output, e))?;
    Ok(Artifact::new(map_path_for(output), json))
}

/// Trailing `sourceMappingURL` comment pointing at the map's absolute URL.
pub fn mapping_url_comment(output: &Path, block_comment: bool) -> String {
    let url = format!("/{}", map_path_for(output).to_string_lossy().replace('\\', "/"));
    if block_comment {
        format!("\n/*# sourceMappingURL={url} */\n")
    } else {
        format!("\n//# sourceMappingURL={url}\n")
    }
}
