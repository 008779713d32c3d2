// src/watch/debounce.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::types::{ChangeEvent, ChangeKind};

/// Pure debouncer: collects change kinds per path and releases them as one
/// batch once the source tree has been quiet for `window`.
///
/// Time is passed in by the caller, so the debouncer can be driven by a
/// fake clock.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    changes: BTreeMap<PathBuf, ChangeKind>,
    last_event: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            changes: BTreeMap::new(),
            last_event: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Record one change, merging with what is already pending for the path
    /// (see [`ChangeKind::merge`]). Every call restarts the quiet window.
    pub fn push(&mut self, path: PathBuf, kind: ChangeKind, now: Instant) {
        self.last_event = Some(now);

        let Some(&existing) = self.changes.get(&path) else {
            trace!(path = %path.display(), kind = kind.label(), "debounce: new path");
            self.changes.insert(path, kind);
            return;
        };

        match existing.merge(kind) {
            Some(merged) => {
                trace!(
                    path = %path.display(),
                    from = existing.label(),
                    to = merged.label(),
                    "debounce: merged change"
                );
                self.changes.insert(path, merged);
            }
            None => {
                trace!(path = %path.display(), "debounce: created then deleted; dropping");
                self.changes.remove(&path);
            }
        }
    }

    /// Whether the quiet window has elapsed since the last event.
    pub fn is_ready(&self, now: Instant) -> bool {
        match self.last_event {
            Some(last) => !self.changes.is_empty() && now.saturating_duration_since(last) >= self.window,
            None => false,
        }
    }

    /// Take the pending batch if the quiet window has elapsed.
    pub fn take_if_ready(&mut self, now: Instant) -> Option<Vec<ChangeEvent>> {
        if !self.is_ready(now) {
            return None;
        }

        self.last_event = None;
        let changes = std::mem::take(&mut self.changes);
        Some(
            changes
                .into_iter()
                .map(|(path, kind)| ChangeEvent::new(path, kind))
                .collect(),
        )
    }

    /// How long to sleep before the batch can be ready, or `None` when
    /// nothing is pending.
    pub fn time_until_ready(&self, now: Instant) -> Option<Duration> {
        if self.changes.is_empty() {
            return None;
        }
        let last = self.last_event?;
        Some(
            self.window
                .saturating_sub(now.saturating_duration_since(last))
                .max(Duration::from_millis(1)),
        )
    }
}
