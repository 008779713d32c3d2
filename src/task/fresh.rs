// src/task/fresh.rs

//! Mtime-based freshness for incremental tasks.

use std::path::Path;
use std::time::SystemTime;

/// Modification time of a file, or `None` if it cannot be read.
pub fn get_mtime(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|m| m.modified()).ok()
}

/// `true` if `output` exists and is not older than `source`.
pub fn is_output_fresh(source: &Path, output: &Path) -> bool {
    let (Some(source_time), Some(output_time)) = (get_mtime(source), get_mtime(output)) else {
        return false;
    };
    output_time >= source_time
}
