// src/capability/imports.rs

//! Dependency scanning for entries that pull in other files.
//!
//! Scanning is regex based: it only needs to find quoted references, not
//! understand the surrounding grammar.

use std::collections::{BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::capability::{read_source, Transform};
use crate::errors::TransformError;

static STYLE_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*@(?:import|use)[ \t]+["']([^"']+)["'][^;\n]*;?"#)
        .expect("valid regex")
});

static TEMPLATE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{%-?\s*(?:include|extends|import|from)\s+["']([^"']+)["']"#)
        .expect("valid regex")
});

static INLINE_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\binline_image\(\s*["']([^"']+)["']\s*\)"#).expect("valid regex")
});

/// Every file reachable from `entry` through the capability's reported
/// dependencies, excluding `entry` itself.
///
/// Returns `None` as soon as one file in the walk cannot report its
/// dependencies.
pub fn dependency_closure(transform: &dyn Transform, entry: &Path) -> Option<BTreeSet<PathBuf>> {
    let mut seen = BTreeSet::new();
    let mut stack = transform.dependencies(entry)?;

    while let Some(path) = stack.pop() {
        if path == entry || !seen.insert(path.clone()) {
            continue;
        }
        // Data files and missing partials have nothing further to report.
        if path.is_file() {
            stack.extend(transform.dependencies(&path)?);
        }
    }

    Some(seen)
}

fn is_remote(spec: &str) -> bool {
    spec.starts_with("http://") || spec.starts_with("https://") || spec.starts_with("//")
}

/// Sass built-in modules (`@use "sass:math"`).
fn is_builtin(spec: &str) -> bool {
    spec.starts_with("sass:")
}

/// Resolve a style `@import` against the importing file's directory.
///
/// `@import "base/vars"` looks for `base/vars`, `base/vars.scss`,
/// `base/_vars.scss`, `base/vars.css` and `base/_vars.css`, in that order.
pub fn resolve_style_import(importer: &Path, spec: &str) -> Option<PathBuf> {
    if is_remote(spec) || is_builtin(spec) {
        return None;
    }
    let dir = importer.parent()?;
    let target = normalize(&dir.join(spec));
    let parent = target.parent()?.to_path_buf();
    let name = target.file_name()?.to_string_lossy().into_owned();

    let mut candidates = vec![target.clone()];
    if Path::new(&name).extension().is_none() {
        for ext in ["scss", "css"] {
            candidates.push(parent.join(format!("{name}.{ext}")));
            candidates.push(parent.join(format!("_{name}.{ext}")));
        }
    } else {
        candidates.push(parent.join(format!("_{name}")));
    }

    candidates.into_iter().find(|p| p.is_file())
}

/// Direct `@import` / `@use` references of a stylesheet that resolve to
/// local files.
pub fn scan_style_imports(path: &Path, source: &str) -> Vec<PathBuf> {
    STYLE_IMPORT_RE
        .captures_iter(source)
        .filter_map(|caps| resolve_style_import(path, &caps[1]))
        .collect()
}

/// Walk the local `@import`/`@use` graph of a stylesheet and fail on the
/// first reference that does not resolve. Returns every file reached,
/// entry first.
pub fn check_style_imports(entry: &Path) -> Result<Vec<PathBuf>, TransformError> {
    let mut visited = HashSet::new();
    let mut reached = Vec::new();
    let mut stack = vec![entry.to_path_buf()];

    while let Some(path) = stack.pop() {
        if !visited.insert(path.clone()) {
            continue;
        }
        let source = read_source(&path)?;
        for caps in STYLE_IMPORT_RE.captures_iter(&source) {
            let spec = &caps[1];
            if is_remote(spec) || is_builtin(spec) {
                continue;
            }
            let resolved = resolve_style_import(&path, spec).ok_or_else(|| {
                TransformError::render(&path, format!("cannot resolve import '{spec}'"))
            })?;
            stack.push(resolved);
        }
        reached.push(path);
    }

    Ok(reached)
}

/// Template names referenced through `include`, `extends`, `import` or
/// `from`, resolved against the views root.
pub fn scan_template_refs(views_root: &Path, source: &str) -> Vec<PathBuf> {
    TEMPLATE_REF_RE
        .captures_iter(source)
        .map(|caps| normalize(&views_root.join(&caps[1])))
        .collect()
}

/// Images a template inlines with `inline_image("<name>")`, resolved
/// against the image source root.
pub fn scan_inline_images(images_root: &Path, source: &str) -> Vec<PathBuf> {
    INLINE_IMAGE_RE
        .captures_iter(source)
        .map(|caps| normalize(&images_root.join(&caps[1])))
        .collect()
}

/// Lexically remove `.` and `..` so scanned paths compare equal to watch
/// event paths.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
