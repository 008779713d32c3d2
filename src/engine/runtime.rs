// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::sink::ErrorSink;
use crate::types::BuildResult;

use super::dispatch::{dispatch_results, Reloader};
use super::graph::TaskGraph;
use super::queue::ChangeQueue;
use super::RuntimeEvent;

/// Long-lived watch loop: turns debounced change batches into task graph
/// runs and dispatches their results.
///
/// Only one run executes at a time. Batches arriving meanwhile are merged
/// into the [`ChangeQueue`] and drained as the next run.
pub struct Runtime {
    graph: Arc<TaskGraph>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    reloader: Option<Arc<dyn Reloader>>,
    sink: Arc<dyn ErrorSink>,
    queue: ChangeQueue,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("graph", &self.graph)
            .field("queued", &self.queue.len())
            .field("has_reloader", &self.reloader.is_some())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(
        graph: Arc<TaskGraph>,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            graph,
            event_rx,
            reloader: None,
            sink,
            queue: ChangeQueue::new(),
        }
    }

    pub fn with_reloader(mut self, reloader: Arc<dyn Reloader>) -> Self {
        self.reloader = Some(reloader);
        self
    }

    /// Main event loop.
    ///
    /// Returns once shutdown was requested (or every sender is gone) and the
    /// in-flight run, if any, has finished.
    pub async fn run(mut self) {
        info!("sitepipe runtime started");
        let mut shutdown = false;

        loop {
            if self.queue.is_empty() {
                if shutdown {
                    break;
                }
                match self.event_rx.recv().await {
                    Some(RuntimeEvent::FilesChanged(batch)) => {
                        debug!(changes = batch.len(), "change batch received");
                        self.queue.record(batch);
                    }
                    Some(RuntimeEvent::ShutdownRequested) | None => {
                        self.graph.begin_shutdown();
                        break;
                    }
                }
                continue;
            }

            let changes = self.queue.drain();
            let graph = Arc::clone(&self.graph);
            let run = graph.run_changes(&changes);
            tokio::pin!(run);

            let results = loop {
                tokio::select! {
                    results = &mut run => break results,
                    event = self.event_rx.recv(), if !shutdown => match event {
                        Some(RuntimeEvent::FilesChanged(batch)) => {
                            debug!(changes = batch.len(), "run in progress; queueing batch");
                            self.queue.record(batch);
                        }
                        Some(RuntimeEvent::ShutdownRequested) | None => {
                            info!("shutdown requested; waiting for in-flight tasks");
                            shutdown = true;
                            self.graph.begin_shutdown();
                        }
                    },
                }
            };

            self.dispatch(results).await;

            if shutdown {
                break;
            }
        }

        info!(dropped = self.queue.len(), "sitepipe runtime stopped");
    }

    /// Hand results to the reloader and the sink on the blocking pool;
    /// broadcasting writes to client sockets.
    async fn dispatch(&self, results: Vec<BuildResult>) {
        let reloader = self.reloader.clone();
        let sink = Arc::clone(&self.sink);
        let dispatched = tokio::task::spawn_blocking(move || {
            dispatch_results(&results, reloader.as_deref(), sink.as_ref());
        })
        .await;
        if let Err(err) = dispatched {
            error!(error = %err, "dispatching results failed");
        }
    }
}
