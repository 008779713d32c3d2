// src/serve/response.rs

//! HTTP responses for the dev server.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::capability::sourcemap::MAPS_DIR;

pub mod mime {
    pub const HTML: &str = "text/html; charset=utf-8";
    pub const CSS: &str = "text/css; charset=utf-8";
    pub const JAVASCRIPT: &str = "text/javascript; charset=utf-8";
    pub const JSON: &str = "application/json";
    pub const PLAIN: &str = "text/plain; charset=utf-8";
    pub const OCTET: &str = "application/octet-stream";
}

/// Content type from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => mime::HTML,
        "css" => mime::CSS,
        "js" | "mjs" => mime::JAVASCRIPT,
        "json" | "map" => mime::JSON,
        "txt" => mime::PLAIN,
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        _ => mime::OCTET,
    }
}

/// `/maps/<file>.map` for stylesheets and scripts.
pub fn source_map_header_value(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if ext != "css" && ext != "js" {
        return None;
    }
    let file = path.file_name()?.to_str()?;
    Some(format!("/{MAPS_DIR}/{file}.map"))
}

/// Client script that listens on the reload socket.
///
/// `css` messages bust the cache of every stylesheet link, `reload` reloads
/// the page and `error` is logged to the browser console.
pub fn reload_script(reload_port: u16) -> String {
    format!(
        r#"<script>(function(){{var ws=new WebSocket("ws://"+location.hostname+":{reload_port}");ws.onmessage=function(e){{var m=JSON.parse(e.data);if(m.type==="css"){{document.querySelectorAll('link[rel="stylesheet"]').forEach(function(l){{var u=new URL(l.href);u.searchParams.set("v",Date.now());l.href=u.toString();}});}}else if(m.type==="reload"){{location.reload();}}else if(m.type==="error"){{console.error("[sitepipe] "+m.task+": "+m.message);}}}};}})();</script>"#
    )
}

/// Insert the reload script before the last `</body>`, or append it.
pub fn inject_reload_script(body: &[u8], reload_port: u16) -> Vec<u8> {
    const PATTERN: &[u8] = b"</body>";

    let script = reload_script(reload_port);
    let script = script.as_bytes();
    let mut out = Vec::with_capacity(body.len() + script.len());

    match body
        .windows(PATTERN.len())
        .rposition(|w| w.eq_ignore_ascii_case(PATTERN))
    {
        Some(pos) => {
            out.extend_from_slice(&body[..pos]);
            out.extend_from_slice(script);
            out.extend_from_slice(&body[pos..]);
        }
        None => {
            out.extend_from_slice(body);
            out.extend_from_slice(script);
        }
    }
    out
}

/// Serve a file from the output directory.
pub fn respond_file(request: Request, path: &Path, reload_port: Option<u16>) -> Result<()> {
    let content_type = content_type_for(path);
    let mut headers = vec![make_header("Content-Type", content_type)?];
    if let Some(map) = source_map_header_value(path) {
        headers.push(make_header("X-SourceMap", &map)?);
    }

    if request.method() == &Method::Head {
        let mut response = Response::empty(StatusCode(200));
        for header in headers {
            response.add_header(header);
        }
        request.respond(response)?;
        return Ok(());
    }

    let body = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let body = match reload_port {
        Some(port) if content_type == mime::HTML => inject_reload_script(&body, port),
        _ => body,
    };

    let mut response = Response::from_data(body).with_status_code(StatusCode(200));
    for header in headers {
        response.add_header(header);
    }
    request.respond(response)?;
    Ok(())
}

pub fn respond_not_found(request: Request) -> Result<()> {
    let response = Response::from_string("404 Not Found")
        .with_status_code(StatusCode(404))
        .with_header(make_header("Content-Type", mime::PLAIN)?);
    request.respond(response)?;
    Ok(())
}

pub fn respond_method_not_allowed(request: Request) -> Result<()> {
    let response = Response::from_string("405 Method Not Allowed")
        .with_status_code(StatusCode(405))
        .with_header(make_header("Allow", "GET, HEAD")?);
    request.respond(response)?;
    Ok(())
}

fn make_header(key: &str, value: &str) -> Result<Header> {
    Header::from_bytes(key.as_bytes(), value.as_bytes())
        .map_err(|()| anyhow::anyhow!("invalid header {key}: {value}"))
}
