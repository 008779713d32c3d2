// src/capability/markup.rs

use std::path::{Path, PathBuf};

use minijinja::{path_loader, Environment, Error as TemplateError, ErrorKind, UndefinedBehavior};
use serde_json::{json, Map, Value};
use walkdir::WalkDir;

use crate::capability::imports::{normalize, scan_inline_images, scan_template_refs};
use crate::capability::minify::minify_html;
use crate::capability::{read_source, Artifact, Transform};
use crate::errors::{SitepipeError, TransformError};
use crate::types::ArtifactKind;

/// Name of the global data file under the data root.
pub const GLOBAL_DATA_FILE: &str = "_.json";

/// Renders a view with minijinja and minifies the resulting HTML.
///
/// Each view `<name>.<ext>` is rendered with the context
/// `{ "_": <data/_.json>, "page": <data/<name>.json>, "page_name": "<name>" }`.
/// Missing data files are empty objects.
///
/// Templates can embed a text image (SVG) with `{{ inline_image("icon.svg") }}`.
/// The optimized copy under the output image directory is read first, then
/// the source image.
#[derive(Debug, Clone)]
pub struct MarkupTransform {
    views: PathBuf,
    data: PathBuf,
    images_source: PathBuf,
    images_output: PathBuf,
}

impl MarkupTransform {
    pub fn new(views: impl Into<PathBuf>, data: impl Into<PathBuf>) -> Self {
        let views = views.into();
        Self {
            images_source: views.join("images"),
            images_output: views.join("images"),
            views,
            data: data.into(),
        }
    }

    /// Set where `inline_image` looks: the image sources, and the image
    /// output directory the images task writes to.
    pub fn with_inline_images(
        mut self,
        source: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        self.images_source = source.into();
        self.images_output = output.into();
        self
    }

    fn page_name(entry: &Path) -> String {
        entry
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn global_data_path(&self) -> PathBuf {
        self.data.join(GLOBAL_DATA_FILE)
    }

    fn page_data_path(&self, page_name: &str) -> PathBuf {
        self.data.join(format!("{page_name}.json"))
    }

    /// Build the render context for a view. Page and global data live in
    /// separate namespaces.
    pub fn context_for(&self, entry: &Path) -> Result<Value, TransformError> {
        let page_name = Self::page_name(entry);
        let global = load_json_object(&self.global_data_path())?;
        let page = load_json_object(&self.page_data_path(&page_name))?;
        Ok(json!({
            "_": global,
            "page": page,
            "page_name": page_name,
        }))
    }
}

impl Transform for MarkupTransform {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Markup
    }

    fn output_name(&self, rel: &Path) -> PathBuf {
        rel.with_extension("html")
    }

    fn dependencies(&self, entry: &Path) -> Option<Vec<PathBuf>> {
        if entry.extension().is_some_and(|ext| ext == "json") {
            return Some(Vec::new());
        }

        let source = read_source(entry).ok()?;
        let mut deps = scan_template_refs(&self.views, &source);
        deps.extend(scan_inline_images(&self.images_source, &source));

        // Only top-level views get data; included templates share it.
        if entry.parent() == Some(self.views.as_path()) {
            deps.push(self.global_data_path());
            deps.push(self.page_data_path(&Self::page_name(entry)));
        }
        Some(deps)
    }

    fn transform(&self, entry: &Path, output: &Path) -> Result<Vec<Artifact>, TransformError> {
        let context = self.context_for(entry)?;

        let template_name = entry
            .strip_prefix(&self.views)
            .map_err(|_| TransformError::render(entry, "view is outside of the views root"))?
            .to_string_lossy()
            .replace('\\', "/");

        let mut env = Environment::new();
        env.set_loader(path_loader(&self.views));
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        let source_root = self.images_source.clone();
        let output_root = self.images_output.clone();
        env.add_function("inline_image", move |name: String| {
            inline_image(&source_root, &output_root, &name)
        });

        let rendered = env
            .get_template(&template_name)
            .and_then(|tmpl| tmpl.render(&context))
            .map_err(|e| TransformError::render(entry, format!("{e:#}")))?;

        Ok(vec![Artifact::new(output, minify_html(&rendered))])
    }
}

fn inline_image(
    source_root: &Path,
    output_root: &Path,
    name: &str,
) -> Result<minijinja::Value, TemplateError> {
    let candidates = [
        normalize(&output_root.join(name)),
        normalize(&source_root.join(name)),
    ];
    let inside = |path: &Path| path.starts_with(output_root) || path.starts_with(source_root);
    let Some(path) = candidates.iter().find(|p| inside(p.as_path()) && p.is_file()) else {
        return Err(TemplateError::new(
            ErrorKind::InvalidOperation,
            format!("inline_image: no image named '{name}'"),
        ));
    };

    let bytes = std::fs::read(path).map_err(|e| {
        TemplateError::new(ErrorKind::InvalidOperation, format!("inline_image: '{name}': {e}"))
    })?;
    let text = String::from_utf8(bytes).map_err(|_| {
        TemplateError::new(
            ErrorKind::InvalidOperation,
            format!("inline_image: '{name}' is not a text image"),
        )
    })?;
    Ok(minijinja::Value::from_safe_string(text))
}

/// Parse a JSON object from `path`. A missing file is an empty object.
fn load_json_object(path: &Path) -> Result<Value, TransformError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Value::Object(Map::new()));
        }
        Err(e) => return Err(TransformError::io(path, e)),
    };

    serde_json::from_str(&contents).map_err(|source| TransformError::Data {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse every `*.json` file under the data root. A malformed file is a
/// configuration error.
pub fn validate_data_dir(data: &Path) -> crate::errors::Result<usize> {
    if !data.is_dir() {
        return Ok(0);
    }

    let mut checked = 0;
    for entry in WalkDir::new(data).sort_by_file_name() {
        let entry = entry.map_err(|e| SitepipeError::Other(e.into()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        load_json_object(path).map_err(|e| SitepipeError::ConfigError(e.to_string()))?;
        checked += 1;
    }

    Ok(checked)
}
