// src/watch/watcher.rs

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::engine::RuntimeEvent;
use crate::types::ChangeKind;
use crate::watch::debounce::Debouncer;
use crate::watch::path_utils::is_temp_file;

/// Handle for the filesystem watcher.
///
/// Keeps the underlying `RecommendedWatcher` alive. Dropping this handle
/// stops file watching and the forwarding task.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
    forwarder: JoinHandle<()>,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// Map a notify event kind to a change kind. Metadata-only and access
/// events are ignored.
///
/// The old name of a rename is a deletion and the new name a creation.
/// Renames reported as a single event (`Both`, `Any`) map to `Modified`
/// and are settled per path by [`settle_change`].
pub fn classify_event(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(ChangeKind::Created),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        _ => None,
    }
}

/// A path that is gone by the time its event is handled was deleted,
/// whatever the event said.
pub fn settle_change(kind: ChangeKind, path: &Path) -> ChangeKind {
    if kind != ChangeKind::Deleted && !path.exists() {
        ChangeKind::Deleted
    } else {
        kind
    }
}

/// Spawn a filesystem watcher that observes `root` recursively and sends
/// one `RuntimeEvent::FilesChanged` per debounced batch.
///
/// Paths in the batch are absolute. Directories and editor temp files are
/// skipped.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    debounce: Duration,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> Result<WatcherHandle> {
    let root = root.into();
    let root = root.canonicalize().unwrap_or(root);

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                // Receiver gone means we are shutting down.
                let _ = event_tx.send(event);
            }
            Err(err) => {
                warn!(error = %err, "file watch error");
            }
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;

    info!(root = %root.display(), debounce_ms = debounce.as_millis() as u64, "file watcher started");

    let forwarder = tokio::spawn(async move {
        let mut debouncer = Debouncer::new(debounce);

        loop {
            let sleep_for = debouncer
                .time_until_ready(Instant::now())
                .unwrap_or(Duration::from_secs(3600));

            tokio::select! {
                maybe_event = event_rx.recv() => {
                    let Some(event) = maybe_event else { break };
                    let Some(kind) = classify_event(&event.kind) else {
                        trace!(?event, "ignoring notify event");
                        continue;
                    };
                    let now = Instant::now();
                    for path in event.paths {
                        if is_temp_file(&path) || path.is_dir() {
                            continue;
                        }
                        let kind = settle_change(kind, &path);
                        debug!(path = %path.display(), kind = kind.label(), "raw change");
                        debouncer.push(path, kind, now);
                    }
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }

            if let Some(batch) = debouncer.take_if_ready(Instant::now()) {
                debug!(changes = batch.len(), "debounced change batch ready");
                if runtime_tx.send(RuntimeEvent::FilesChanged(batch)).await.is_err() {
                    debug!("runtime channel closed; stopping watcher");
                    break;
                }
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle {
        _inner: watcher,
        forwarder,
    })
}
