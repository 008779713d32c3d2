// src/serve/mod.rs

//! Development server: static files from the output root plus live reload.

pub mod path;
pub mod reload;
pub mod response;

pub use reload::ReloadBroadcaster;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use tiny_http::{Method, Request, Server};
use tracing::{debug, info, warn};

use crate::config::model::ServerSection;

/// Maximum number of consecutive ports tried when binding.
pub const MAX_PORT_RETRIES: u16 = 10;

pub struct DevServer;

impl DevServer {
    /// Bind HTTP and reload sockets and start serving `output_dir`.
    pub fn start(output_dir: &Path, server: &ServerSection) -> Result<ServerHandle> {
        let reloader = ReloadBroadcaster::bind(&server.host, server.reload_port)?;
        let (http, addr) = bind_with_retry(&server.host, server.port)?;
        let http = Arc::new(http);

        let thread = {
            let http = Arc::clone(&http);
            let root = output_dir.to_path_buf();
            let reload_port = reloader.port();
            thread::Builder::new()
                .name("sitepipe-http".into())
                .spawn(move || request_loop(&http, &root, reload_port))
                .context("failed to spawn HTTP server thread")?
        };

        info!(url = %format!("http://{addr}{}", server.start_path), "serving");

        Ok(ServerHandle {
            http,
            addr,
            reloader,
            thread: Some(thread),
        })
    }
}

/// Running dev server.
pub struct ServerHandle {
    http: Arc<Server>,
    addr: SocketAddr,
    reloader: Arc<ReloadBroadcaster>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn reloader(&self) -> Arc<ReloadBroadcaster> {
        Arc::clone(&self.reloader)
    }

    /// Unblock the HTTP loop, wait for it and close every reload client.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.http.unblock();
        if thread.join().is_err() {
            warn!("HTTP server thread panicked");
        }
        self.reloader.shutdown();
        info!("dev server stopped");
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn request_loop(server: &Server, root: &Path, reload_port: u16) {
    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, root, reload_port) {
            debug!(error = %e, "request failed");
        }
    }
    debug!("HTTP request loop finished");
}

fn handle_request(request: Request, root: &Path, reload_port: u16) -> Result<()> {
    if !matches!(request.method(), Method::Get | Method::Head) {
        return response::respond_method_not_allowed(request);
    }

    match path::resolve_path(request.url(), root) {
        Some(file) => response::respond_file(request, &file, Some(reload_port)),
        None => {
            debug!(url = request.url(), "not found");
            response::respond_not_found(request)
        }
    }
}

fn bind_with_retry(host: &str, base_port: u16) -> Result<(Server, SocketAddr)> {
    let mut last_error = String::new();
    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        let target = format!("{host}:{port}");
        match Server::http(&target) {
            Ok(server) => {
                let addr = server
                    .server_addr()
                    .to_ip()
                    .with_context(|| format!("server bound to a non-IP address for {target}"))?;
                if offset > 0 {
                    info!(requested = base_port, port, "port in use; using next free port");
                }
                return Ok((server, addr));
            }
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(anyhow::anyhow!(
        "failed to bind HTTP server after {MAX_PORT_RETRIES} attempts (ports {base_port}-{}): {last_error}",
        base_port.saturating_add(MAX_PORT_RETRIES - 1)
    ))
}
