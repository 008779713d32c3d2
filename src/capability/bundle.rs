// src/capability/bundle.rs

//! Script linking.
//!
//! An entry and every module it reaches through relative or `node_modules`
//! imports are wrapped into one classic script. Each module becomes a
//! `function (exports, module, require)` keyed by a numeric id, and the
//! entry runs as id 0.
//!
//! ESM statements are rewritten line by line with regexes, and CommonJS
//! `require("...")` calls with a literal specifier are pointed at module
//! ids. Rewrites keep the line count of the text they replace.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::capability::imports::normalize;
use crate::capability::read_source;
use crate::errors::TransformError;

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^([ \t]*)import\s+(?:([\w$]+)\s*,?\s*)?(?:\*\s*as\s+([\w$]+)|\{([^}]*)\})?\s*(?:from\s*)?["']([^"']+)["'][ \t]*;?"#,
    )
    .expect("valid regex")
});

static EXPORT_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^([ \t]*)export\s*(?:\*\s*as\s+([\w$]+)|(\*)|\{([^}]*)\})\s*from\s*["']([^"']+)["'][ \t]*;?"#,
    )
    .expect("valid regex")
});

static EXPORT_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^([ \t]*)export\s*\{([^}]*)\}[ \t]*;?"#).expect("valid regex")
});

static EXPORT_DEFAULT_NAMED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^([ \t]*)export\s+default\s+((?:async\s+)?function\s*\*?\s*([\w$]+)|class\s+([\w$]+))"#)
        .expect("valid regex")
});

static EXPORT_DEFAULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^([ \t]*)export\s+default\s+"#).expect("valid regex")
});

static EXPORT_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^([ \t]*)export\s+((?:const|let|var)\s+([\w$]+)|(?:async\s+)?function\s*\*?\s*([\w$]+)|class\s+([\w$]+))"#,
    )
    .expect("valid regex")
});

static REQUIRE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\brequire\(\s*["']([^"']+)["']\s*\)"#).expect("valid regex")
});

static LEFTOVER_EXPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^[ \t]*export\b"#).expect("valid regex"));

const RUNTIME_HEAD: &str = r#"(function () {
var __cache = {};
function __require(id) {
  var cached = __cache[id];
  if (cached) return cached.exports;
  var module = (__cache[id] = { exports: {} });
  __modules[id].call(module.exports, module.exports, module, __require);
  return module.exports;
}
function __esm(exports) {
  Object.defineProperty(exports, "__esModule", { value: true });
}
function __def(exports, getters) {
  for (var name in getters) {
    Object.defineProperty(exports, name, { enumerable: true, get: getters[name] });
  }
}
function __star(exports, from) {
  Object.keys(from).forEach(function (name) {
    if (name !== "default" && !Object.prototype.hasOwnProperty.call(exports, name)) {
      Object.defineProperty(exports, name, { enumerable: true, get: function () { return from[name]; } });
    }
  });
}
function __default(m) {
  return m && m.__esModule ? m["default"] : m;
}
var __modules = [
"#;

const RUNTIME_TAIL: &str = "];\n__require(0);\n})();\n";

/// A linked script: the code to minify, and every module it contains,
/// entry first.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub code: String,
    pub modules: Vec<PathBuf>,
}

/// Link `entry` with the modules it imports.
///
/// An entry with no imports, exports or resolvable requires comes back
/// unchanged.
pub fn bundle_entry(entry: &Path) -> Result<Bundle, TransformError> {
    let mut linker = Linker::default();
    linker.id_of(entry);

    let mut bodies = Vec::new();
    let mut next = 0;
    while next < linker.modules.len() {
        let path = linker.modules[next].clone();
        let source = read_source(&path)?;
        let module = linker.rewrite(&path, &source)?;
        if next == 0 && !module.linked && linker.modules.len() == 1 {
            return Ok(Bundle {
                code: source,
                modules: linker.modules,
            });
        }
        bodies.push(module.body);
        next += 1;
    }

    let mut code = String::from(RUNTIME_HEAD);
    for (path, body) in linker.modules.iter().zip(&bodies) {
        code.push_str(&format!(
            "// {}\nfunction (exports, module, require) {{\n{body}\n}},\n",
            path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
        ));
    }
    code.push_str(RUNTIME_TAIL);

    Ok(Bundle {
        code,
        modules: linker.modules,
    })
}

/// Direct imports and requires of a script that resolve to files.
pub fn scan_script_imports(path: &Path, source: &str) -> Vec<PathBuf> {
    let specs = IMPORT_RE
        .captures_iter(source)
        .chain(EXPORT_FROM_RE.captures_iter(source))
        .map(|caps| caps[5].to_string())
        .chain(
            REQUIRE_RE
                .captures_iter(source)
                .map(|caps| caps[1].to_string()),
        );

    let mut found = Vec::new();
    for spec in specs {
        if let Some(resolved) = resolve_script_import(path, &spec)
            && !found.contains(&resolved)
        {
            found.push(resolved);
        }
    }
    found
}

/// Resolve an import specifier the way a bundler would.
///
/// Relative specifiers try the exact path, then `.js`, `.mjs`, `.cjs` and
/// `/index.js`. Bare specifiers are looked up in `node_modules` directories
/// from the importer upwards, honouring `module` and then `main` in the
/// package's `package.json`.
pub fn resolve_script_import(importer: &Path, spec: &str) -> Option<PathBuf> {
    let dir = importer.parent()?;
    if spec.starts_with("./") || spec.starts_with("../") {
        return resolve_file(&normalize(&dir.join(spec)));
    }
    if spec.starts_with('/') || spec.contains(':') {
        return None;
    }

    let (package, subpath) = split_package(spec)?;
    for ancestor in dir.ancestors() {
        let root = ancestor.join("node_modules").join(package);
        if !root.is_dir() {
            continue;
        }
        return match subpath {
            Some(sub) => resolve_file(&root.join(sub)),
            None => resolve_package_main(&root),
        };
    }
    None
}

fn resolve_file(base: &Path) -> Option<PathBuf> {
    let mut candidates = vec![base.to_path_buf()];
    for suffix in [".js", ".mjs", ".cjs"] {
        let mut name = base.as_os_str().to_owned();
        name.push(suffix);
        candidates.push(PathBuf::from(name));
    }
    candidates.push(base.join("index.js"));
    candidates.into_iter().find(|p| p.is_file())
}

fn resolve_package_main(root: &Path) -> Option<PathBuf> {
    let manifest = std::fs::read_to_string(root.join("package.json"))
        .ok()
        .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok());
    if let Some(manifest) = manifest {
        for field in ["module", "main"] {
            if let Some(main) = manifest.get(field).and_then(|v| v.as_str())
                && let Some(found) = resolve_file(&normalize(&root.join(main)))
            {
                return Some(found);
            }
        }
    }
    resolve_file(&root.join("index.js"))
}

/// `lodash/fp` -> (`lodash`, `fp`), `@scope/pkg/x` -> (`@scope/pkg`, `x`).
fn split_package(spec: &str) -> Option<(&str, Option<&str>)> {
    let name_len = if spec.starts_with('@') {
        let slash = spec.find('/')?;
        spec[slash + 1..]
            .find('/')
            .map_or(spec.len(), |i| slash + 1 + i)
    } else {
        spec.find('/').unwrap_or(spec.len())
    };
    let (name, rest) = spec.split_at(name_len);
    let sub = rest.strip_prefix('/').filter(|s| !s.is_empty());
    Some((name, sub))
}

struct LinkedModule {
    body: String,
    linked: bool,
}

#[derive(Default)]
struct Linker {
    modules: Vec<PathBuf>,
    ids: HashMap<PathBuf, usize>,
    temps: usize,
}

impl Linker {
    fn id_of(&mut self, path: &Path) -> usize {
        if let Some(&id) = self.ids.get(path) {
            return id;
        }
        let id = self.modules.len();
        self.modules.push(path.to_path_buf());
        self.ids.insert(path.to_path_buf(), id);
        id
    }

    fn temp(&mut self) -> String {
        self.temps += 1;
        format!("__m{}", self.temps)
    }

    fn require_expr(&mut self, importer: &Path, spec: &str) -> Result<String, TransformError> {
        let resolved = resolve_script_import(importer, spec).ok_or_else(|| {
            TransformError::render(importer, format!("cannot resolve import '{spec}'"))
        })?;
        Ok(format!("require({})", self.id_of(&resolved)))
    }

    fn rewrite(&mut self, path: &Path, source: &str) -> Result<LinkedModule, TransformError> {
        let mut getters: Vec<(String, String)> = Vec::new();
        let mut esm = false;

        // Re-exports first, so the plain export list pattern never sees them.
        let text = self.replace(source, &EXPORT_FROM_RE, |linker, caps| {
            let require = linker.require_expr(path, &caps[5])?;
            let indent = &caps[1];
            if let Some(ns) = caps.get(2) {
                let temp = linker.temp();
                getters.push((ns.as_str().to_string(), temp.clone()));
                return Ok(format!("{indent}var {temp} = {require};"));
            }
            if caps.get(3).is_some() {
                return Ok(format!("{indent}__star(exports, {require});"));
            }
            let temp = linker.temp();
            for (local, exported) in parse_specifiers(&caps[4]) {
                let value = if local == "default" {
                    format!("__default({temp})")
                } else {
                    format!("{temp}.{local}")
                };
                getters.push((exported, value));
            }
            Ok(format!("{indent}var {temp} = {require};"))
        })?;
        esm |= text != source;

        let before = text.clone();
        let text = self.replace(&text, &IMPORT_RE, |linker, caps| {
            let require = linker.require_expr(path, &caps[5])?;
            let indent = &caps[1];
            let default = caps.get(2).map(|m| m.as_str());
            let namespace = caps.get(3).map(|m| m.as_str());
            let named = caps.get(4).map(|m| parse_specifiers(m.as_str()));

            if default.is_none() && namespace.is_none() && named.is_none() {
                return Ok(format!("{indent}{require};"));
            }

            let temp = linker.temp();
            let mut decls = vec![format!("{temp} = {require}")];
            if let Some(name) = default {
                decls.push(format!("{name} = __default({temp})"));
            }
            if let Some(ns) = namespace {
                decls.push(format!("{ns} = {temp}"));
            }
            for (imported, local) in named.unwrap_or_default() {
                if imported == "default" {
                    decls.push(format!("{local} = __default({temp})"));
                } else {
                    decls.push(format!("{local} = {temp}.{imported}"));
                }
            }
            Ok(format!("{indent}var {};", decls.join(", ")))
        })?;
        esm |= text != before;

        let before = text.clone();
        let text = self.replace(&text, &EXPORT_LIST_RE, |_, caps| {
            for (local, exported) in parse_specifiers(&caps[2]) {
                getters.push((exported, local));
            }
            Ok(caps[1].to_string())
        })?;
        let text = self.replace(&text, &EXPORT_DEFAULT_NAMED_RE, |_, caps| {
            let name = caps.get(3).or_else(|| caps.get(4)).map_or("", |m| m.as_str());
            getters.push(("default".to_string(), name.to_string()));
            Ok(format!("{}{}", &caps[1], &caps[2]))
        })?;
        let text = self.replace(&text, &EXPORT_DEFAULT_RE, |_, caps| {
            Ok(format!("{}exports[\"default\"] = ", &caps[1]))
        })?;
        let text = self.replace(&text, &EXPORT_DECL_RE, |_, caps| {
            let name = caps
                .get(3)
                .or_else(|| caps.get(4))
                .or_else(|| caps.get(5))
                .map_or("", |m| m.as_str());
            getters.push((name.to_string(), name.to_string()));
            Ok(format!("{}{}", &caps[1], &caps[2]))
        })?;
        esm |= text != before;

        if let Some(found) = LEFTOVER_EXPORT_RE.find(&text) {
            let line = text[..found.start()].matches('\n').count() + 1;
            return Err(TransformError::render(
                path,
                format!("unsupported export statement on line {line}"),
            ));
        }

        let before = text.clone();
        let text = self.replace(&text, &REQUIRE_RE, |linker, caps| {
            Ok(match resolve_script_import(path, &caps[1]) {
                Some(resolved) => format!("require({})", linker.id_of(&resolved)),
                None => caps[0].to_string(),
            })
        })?;
        let required = text != before;

        let mut header = String::new();
        if esm {
            header.push_str("__esm(exports);");
        }
        if !getters.is_empty() {
            let entries: Vec<String> = getters
                .iter()
                .map(|(name, value)| format!("{name:?}: function () {{ return {value}; }}"))
                .collect();
            header.push_str(&format!(" __def(exports, {{ {} }});", entries.join(", ")));
        }

        Ok(LinkedModule {
            body: format!("{header}\n{text}"),
            linked: esm || required,
        })
    }

    /// `Regex::replace_all` with a fallible closure that can reach the
    /// linker. Replacements get padded to the newline count of the match.
    fn replace(
        &mut self,
        text: &str,
        re: &Regex,
        mut f: impl FnMut(&mut Self, &Captures<'_>) -> Result<String, TransformError>,
    ) -> Result<String, TransformError> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in re.captures_iter(text) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            out.push_str(&text[last..whole.start]);
            let replacement = f(self, &caps)?;
            let missing = text[whole.clone()]
                .matches('\n')
                .count()
                .saturating_sub(replacement.matches('\n').count());
            out.push_str(&replacement);
            out.push_str(&"\n".repeat(missing));
            last = whole.end;
        }
        out.push_str(&text[last..]);
        Ok(out)
    }
}

/// `a, b as c` -> [(a, a), (b, c)].
fn parse_specifiers(list: &str) -> Vec<(String, String)> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|spec| match spec.split_once(" as ") {
            Some((from, to)) => (from.trim().to_string(), to.trim().to_string()),
            None => (spec.to_string(), spec.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_names_split_from_subpaths() {
        assert_eq!(split_package("lodash"), Some(("lodash", None)));
        assert_eq!(split_package("lodash/fp"), Some(("lodash", Some("fp"))));
        assert_eq!(split_package("@scope/pkg"), Some(("@scope/pkg", None)));
        assert_eq!(
            split_package("@scope/pkg/deep/x"),
            Some(("@scope/pkg", Some("deep/x")))
        );
    }

    #[test]
    fn specifier_lists_keep_aliases() {
        assert_eq!(
            parse_specifiers(" a, b as c ,\n default as d, "),
            vec![
                ("a".to_string(), "a".to_string()),
                ("b".to_string(), "c".to_string()),
                ("default".to_string(), "d".to_string()),
            ]
        );
    }
}
