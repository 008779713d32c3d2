// src/engine/mod.rs

//! Orchestration engine for sitepipe.
//!
//! This module ties together:
//! - the task graph (declared tasks plus the DAG scheduler)
//! - the change queue (what happens when changes arrive while a run is active)
//! - result dispatch to the reload broadcaster and the error sink
//! - the main runtime event loop that reacts to:
//!   - debounced file changes
//!   - shutdown signals

use crate::types::ChangeEvent;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Outcome of a task invocation for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed,
}

/// Events flowing into the runtime from the watcher and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// One debounced batch of filesystem changes.
    FilesChanged(Vec<ChangeEvent>),
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod dispatch;
pub mod graph;
pub mod queue;
pub mod runtime;

pub use dispatch::{dispatch_results, Reloader};
pub use graph::{TaskGraph, TaskGraphBuilder};
pub use queue::ChangeQueue;
pub use runtime::Runtime;
