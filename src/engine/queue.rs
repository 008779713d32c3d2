// src/engine/queue.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::debug;

use crate::types::ChangeEvent;

/// Changes that arrive while a run is already executing.
///
/// Runs are serialized: everything recorded here becomes the *next* run.
/// Batches are merged per path with the same rules as the debouncer, so a
/// file saved three times during a long build is rebuilt once.
#[derive(Debug, Default)]
pub struct ChangeQueue {
    pending: BTreeMap<PathBuf, ChangeEvent>,
}

impl ChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if there are no queued changes.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Merge a batch into the queue.
    pub fn record(&mut self, batch: impl IntoIterator<Item = ChangeEvent>) {
        for event in batch {
            match self.pending.remove(&event.path) {
                None => {
                    self.pending.insert(event.path.clone(), event);
                }
                Some(existing) => match existing.kind.merge(event.kind) {
                    Some(kind) => {
                        let merged = ChangeEvent { kind, ..event };
                        self.pending.insert(merged.path.clone(), merged);
                    }
                    None => {
                        debug!(path = %event.path.display(), "queued change cancelled out");
                    }
                },
            }
        }
    }

    /// Take every queued change, ordered by path.
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        let changes: Vec<ChangeEvent> = std::mem::take(&mut self.pending).into_values().collect();
        debug!(drained = changes.len(), "drained queued changes into new run");
        changes
    }
}
