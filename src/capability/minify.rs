// src/capability/minify.rs

//! Minification for HTML, CSS and JS.
//!
//! Uses minify-html for documents (inline `<style>` and `<script>` included),
//! lightningcss for stylesheets and oxc for scripts. Stylesheets and scripts
//! can return a v3 source map of the minified output.

use std::path::PathBuf;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::Targets;
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;
use parcel_sourcemap::SourceMap;

/// Minified code plus its source map JSON, when one was requested.
#[derive(Debug, Clone)]
pub struct Minified {
    pub code: String,
    pub map: Option<String>,
}

/// Minify a classic (non-module) script.
///
/// With `source_name`, the returned map points into `source` under that
/// name.
pub fn minify_js(source: &str, source_name: Option<&str>) -> Result<Minified, String> {
    let allocator = Allocator::default();
    let source_type = SourceType::cjs();
    let ret = Parser::new(&allocator, source, source_type).parse();
    if !ret.errors.is_empty() {
        let messages: Vec<String> = ret.errors.iter().map(|e| e.to_string()).collect();
        return Err(messages.join("; "));
    }
    let mut program = ret.program;
    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::smallest()),
    };
    let ret = Minifier::new(options).minify(&allocator, &mut program);
    let ret = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            source_map_path: source_name.map(PathBuf::from),
            ..CodegenOptions::default()
        })
        .with_scoping(ret.scoping)
        .build(&program);

    Ok(Minified {
        code: ret.code,
        map: ret.map.map(|map| map.to_json_string()),
    })
}

/// Lower CSS for `targets` (vendor prefixes, nesting) and minify it.
///
/// With `source_name`, the returned map points into `source` under that
/// name.
pub fn minify_css(
    source: &str,
    targets: Targets,
    source_name: Option<&str>,
) -> Result<Minified, String> {
    let parser_options = ParserOptions {
        filename: source_name.unwrap_or_default().to_string(),
        ..ParserOptions::default()
    };
    let mut stylesheet = StyleSheet::parse(source, parser_options).map_err(|e| e.to_string())?;
    stylesheet
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| e.to_string())?;

    let mut source_map = match source_name {
        Some(name) => {
            let mut map = SourceMap::new("/");
            map.add_source(name);
            map.set_source_content(0, source).map_err(|e| e.to_string())?;
            Some(map)
        }
        None => None,
    };

    let result = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            targets,
            source_map: source_map.as_mut(),
            ..PrinterOptions::default()
        })
        .map_err(|e| e.to_string())?;

    let map = match source_map.as_mut() {
        Some(map) => Some(map.to_json(None).map_err(|e| e.to_string())?),
        None => None,
    };

    Ok(Minified {
        code: result.code,
        map,
    })
}

/// Minify a rendered HTML document: comments go, whitespace collapses, and
/// inline styles and scripts are minified. Closing tags and the
/// `<html>`/`<head>` tags stay so the reload client can be injected.
pub fn minify_html(source: &str) -> String {
    let mut cfg = minify_html::Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = false;
    cfg.minify_css = true;
    cfg.minify_js = true;
    cfg.remove_bangs = true;
    cfg.remove_processing_instructions = true;

    let minified = minify_html::minify(source.as_bytes(), &cfg);
    String::from_utf8_lossy(&minified).into_owned()
}
