// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Compiling `input` / `watch` / `exclude` glob patterns per task.
//! - Wiring up a cross-platform filesystem watcher (`notify`) and
//!   debouncing its events into change batches.
//! - Content hashing to drop modifications that did not change a file.
//!
//! It does **not** know about the DAG or task dependencies; it only turns
//! filesystem changes into `ChangeEvent` batches.

pub mod cache;
pub mod debounce;
pub mod hash;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use cache::ContentFilter;
pub use debounce::Debouncer;
pub use hash::{compute_file_hash, FileHashStore, HashStore, MemoryHashStore, HASH_FILE_PATH};
pub use patterns::{build_globset, PathRole, TaskPatterns};
pub use watcher::{classify_event, settle_change, spawn_watcher, WatcherHandle};
