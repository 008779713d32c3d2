// src/serve/reload.rs

//! WebSocket live-reload broadcaster.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message;
use tungstenite::WebSocket;

use crate::engine::Reloader;
use crate::errors::ErrorDetail;
use crate::types::BuildResult;

use super::MAX_PORT_RETRIES;

const ACCEPT_POLL: Duration = Duration::from_millis(100);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

/// Pushes reload messages to every connected browser.
///
/// Messages are JSON objects with a `type` field:
/// - `{"type":"css","paths":[...]}`: stylesheets changed, swap in place
/// - `{"type":"reload"}`: anything else changed, reload the page
/// - `{"type":"error","task":...,"message":...}`: a task failed
pub struct ReloadBroadcaster {
    port: u16,
    clients: Clients,
    stopped: Arc<AtomicBool>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ReloadBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadBroadcaster")
            .field("port", &self.port)
            .field("clients", &self.client_count())
            .finish_non_exhaustive()
    }
}

impl ReloadBroadcaster {
    /// Bind the reload socket (retrying on the next ports when taken) and
    /// start accepting clients on a dedicated thread.
    pub fn bind(host: &str, base_port: u16) -> Result<Arc<Self>> {
        let (listener, port) = bind_with_retry(host, base_port)?;
        listener
            .set_nonblocking(true)
            .context("failed to make reload listener non-blocking")?;

        let clients: Clients = Arc::new(Mutex::new(Vec::new()));
        let stopped = Arc::new(AtomicBool::new(false));

        let acceptor = {
            let clients = Arc::clone(&clients);
            let stopped = Arc::clone(&stopped);
            thread::Builder::new()
                .name("sitepipe-reload".into())
                .spawn(move || accept_loop(listener, clients, stopped))
                .context("failed to spawn reload acceptor thread")?
        };

        info!(port, "live reload listening");
        Ok(Arc::new(Self {
            port,
            clients,
            stopped,
            acceptor: Mutex::new(Some(acceptor)),
        }))
    }

    /// Port actually bound.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn client_count(&self) -> usize {
        lock(&self.clients).len()
    }

    /// Send `payload` to every client, dropping the ones that fail.
    pub fn broadcast(&self, payload: &serde_json::Value) {
        let text = payload.to_string();
        let mut clients = lock(&self.clients);
        let before = clients.len();
        clients.retain_mut(|ws| match ws.send(Message::Text(text.clone().into())) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "dropping reload client");
                false
            }
        });
        debug!(
            sent = clients.len(),
            dropped = before - clients.len(),
            "reload message broadcast"
        );
    }

    /// Stop accepting and close every client.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let handle = self
            .acceptor
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("reload acceptor thread panicked");
            }
        }

        let mut clients = lock(&self.clients);
        for ws in clients.iter_mut() {
            let _ = ws.close(None);
            let _ = ws.flush();
        }
        let closed = clients.len();
        clients.clear();
        info!(closed, "live reload stopped");
    }
}

impl Reloader for ReloadBroadcaster {
    fn notify_reload(&self, result: &BuildResult) {
        if !result.success {
            return;
        }
        if result.artifact_paths.is_empty() {
            debug!(task = %result.task_name, "no artifacts changed; nothing to reload");
            return;
        }
        self.broadcast(&reload_message(result));
    }

    fn notify_error(&self, task: &str, detail: &ErrorDetail) {
        self.broadcast(&json!({
            "type": "error",
            "task": task,
            "message": detail.to_string(),
        }));
    }
}

/// Message for a successful result: `css` for stylesheets, `reload` for
/// anything else.
pub fn reload_message(result: &BuildResult) -> serde_json::Value {
    if result.kind.is_hot_swappable() {
        let paths: Vec<String> = result
            .artifact_paths
            .iter()
            .filter(|p| p.extension().is_some_and(|e| e == "css"))
            .map(|p| url_path(p))
            .collect();
        if !paths.is_empty() {
            return json!({ "type": "css", "paths": paths });
        }
    }
    json!({ "type": "reload" })
}

fn url_path(path: &Path) -> String {
    let joined: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("/{}", joined.join("/"))
}

fn accept_loop(listener: TcpListener, clients: Clients, stopped: Arc<AtomicBool>) {
    while !stopped.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                let clients = Arc::clone(&clients);
                let stopped = Arc::clone(&stopped);
                let spawned = thread::Builder::new()
                    .name("sitepipe-reload-handshake".into())
                    .spawn(move || handshake(stream, addr, &clients, &stopped));
                if let Err(e) = spawned {
                    warn!(%addr, error = %e, "failed to spawn reload handshake thread");
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                warn!(error = %e, "reload accept failed");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    debug!("reload acceptor stopped");
}

/// Upgrade one connection and register it. A peer that stays silent is
/// dropped after [`HANDSHAKE_TIMEOUT`].
fn handshake(stream: TcpStream, addr: SocketAddr, clients: &Clients, stopped: &AtomicBool) {
    let configured = stream
        .set_nonblocking(false)
        .and_then(|()| stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)))
        .and_then(|()| stream.set_write_timeout(Some(HANDSHAKE_TIMEOUT)));
    if let Err(e) = configured {
        debug!(%addr, error = %e, "reload connection setup failed");
        return;
    }

    let mut ws = match tungstenite::accept(stream) {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%addr, error = %e, "reload handshake failed");
            return;
        }
    };
    let _ = ws.get_ref().set_read_timeout(None);

    let mut clients = lock(clients);
    if stopped.load(Ordering::SeqCst) {
        let _ = ws.close(None);
        let _ = ws.flush();
        return;
    }
    clients.push(ws);
    debug!(%addr, total = clients.len(), "reload client connected");
}

fn bind_with_retry(host: &str, base_port: u16) -> Result<(TcpListener, u16)> {
    let mut last_error = None;
    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind((host, port)) {
            Ok(listener) => {
                let actual = listener.local_addr()?.port();
                if offset > 0 {
                    info!(requested = base_port, port = actual, "reload port in use; using next free port");
                }
                return Ok((listener, actual));
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(anyhow::anyhow!(
        "failed to bind live reload socket after {MAX_PORT_RETRIES} attempts: {}",
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
