// src/capability/styles.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lightningcss::targets::{Browsers, Targets};

use crate::capability::imports::{check_style_imports, scan_style_imports};
use crate::capability::minify::minify_css;
use crate::capability::sourcemap::{mapping_url_comment, source_map_artifact};
use crate::capability::{read_source, Artifact, Transform};
use crate::errors::TransformError;
use crate::types::ArtifactKind;

/// Compiles a stylesheet entry: SCSS goes through grass, then the CSS is
/// lowered for the configured browsers and minified with lightningcss.
///
/// `main.scss` becomes `main.min.css`. Source maps point into the compiled
/// CSS, embedded in the map as `main.css`.
#[derive(Debug, Clone)]
pub struct StyleTransform {
    targets: Targets,
    source_maps: bool,
}

impl StyleTransform {
    pub fn new(browsers: Browsers, source_maps: bool) -> Self {
        Self {
            targets: Targets::from(browsers),
            source_maps,
        }
    }
}

impl Transform for StyleTransform {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Style
    }

    fn output_name(&self, rel: &Path) -> PathBuf {
        rel.with_extension("min.css")
    }

    fn dependencies(&self, entry: &Path) -> Option<Vec<PathBuf>> {
        // Unreadable files report no dependencies; the transform itself
        // surfaces the read error.
        let source = read_source(entry).ok()?;
        Some(scan_style_imports(entry, &source))
    }

    fn transform(&self, entry: &Path, output: &Path) -> Result<Vec<Artifact>, TransformError> {
        check_style_imports(entry)?;
        let compiled = compile_scss(entry)?;

        let source_name = entry
            .with_extension("css")
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let minified = minify_css(
            &compiled,
            self.targets,
            self.source_maps.then_some(source_name.as_str()),
        )
        .map_err(|msg| TransformError::render(entry, msg))?;

        let mut css = minified.code;
        let mut artifacts = Vec::with_capacity(2);
        if let Some(map) = minified.map {
            css.push_str(&mapping_url_comment(output, true));
            artifacts.push(source_map_artifact(output, &map, &compiled)?);
        }
        artifacts.insert(0, Artifact::new(output, css));

        Ok(artifacts)
    }
}

/// Compile a `.scss`/`.sass`/`.css` file to expanded CSS. Imports resolve
/// relative to the file, partials included.
pub fn compile_scss(entry: &Path) -> Result<String, TransformError> {
    let options = grass::Options::default().style(grass::OutputStyle::Expanded);
    grass::from_path(entry, &options).map_err(|e| TransformError::render(entry, e))
}

/// Parse `[build].browser_targets` into lightningcss browser versions.
///
/// Keys are browser names (`chrome`, `edge`, `firefox`, `safari`, `ios_saf`,
/// `opera`, `samsung`, `android`, `ie`); values are `major[.minor[.patch]]`.
pub fn parse_browser_targets(targets: &BTreeMap<String, String>) -> Result<Browsers, String> {
    let mut browsers = Browsers::default();

    for (name, version) in targets {
        let encoded = parse_version(version)
            .ok_or_else(|| format!("invalid version '{version}' for browser '{name}'"))?;
        let slot = match name.as_str() {
            "android" => &mut browsers.android,
            "chrome" => &mut browsers.chrome,
            "edge" => &mut browsers.edge,
            "firefox" => &mut browsers.firefox,
            "ie" => &mut browsers.ie,
            "ios_saf" | "ios" => &mut browsers.ios_saf,
            "opera" => &mut browsers.opera,
            "safari" => &mut browsers.safari,
            "samsung" => &mut browsers.samsung,
            other => return Err(format!("unknown browser '{other}'")),
        };
        *slot = Some(encoded);
    }

    Ok(browsers)
}

/// `"15.4"` -> `(15 << 16) | (4 << 8)`, the encoding lightningcss expects.
fn parse_version(version: &str) -> Option<u32> {
    let mut parts = version.trim().split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    let patch: u32 = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    if parts.next().is_some() || major > 0xff_ff || minor > 0xff || patch > 0xff {
        return None;
    }
    Some((major << 16) | (minor << 8) | patch)
}
