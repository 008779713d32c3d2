// src/watch/cache.rs

use std::path::Path;

use anyhow::Result;
use tracing::{debug, warn};

use crate::types::{ChangeEvent, ChangeKind, HashStorageMode};
use crate::watch::hash::{compute_file_hash, FileHashStore, HashStore, MemoryHashStore};

/// Drops modifications that did not change a file's content.
///
/// Editors often rewrite a file without changing it (save without edits,
/// touch, format-on-save no-ops). The filter remembers the blake3 hash last
/// seen for each path.
pub struct ContentFilter {
    store: Box<dyn HashStore>,
}

impl ContentFilter {
    pub fn new(store: Box<dyn HashStore>) -> Self {
        Self { store }
    }

    pub fn for_mode(mode: HashStorageMode, project_root: &Path) -> Result<Self> {
        let store: Box<dyn HashStore> = match mode {
            HashStorageMode::Memory => Box::new(MemoryHashStore::new()),
            HashStorageMode::File => Box::new(FileHashStore::open(project_root.to_path_buf())?),
        };
        Ok(Self::new(store))
    }

    /// `true` if the event represents a real content change.
    ///
    /// `key` identifies the file in the store (its source-relative path).
    /// Creations and deletions always count; a modification counts unless
    /// the file's hash matches the stored one. Hashing failures count as a
    /// change.
    pub fn content_changed(&mut self, key: &str, event: &ChangeEvent) -> bool {
        if event.kind == ChangeKind::Deleted {
            if let Err(e) = self.store.remove(key) {
                warn!(path = %key, error = %e, "failed to drop stored hash");
            }
            return true;
        }

        let hash = match compute_file_hash(&event.path) {
            Ok(hash) => hash,
            Err(e) => {
                debug!(path = %key, error = %e, "could not hash file; treating as changed");
                return true;
            }
        };

        let previous = self.store.load(key).ok().flatten();
        if previous.as_deref() == Some(hash.as_str()) && event.kind == ChangeKind::Modified {
            debug!(path = %key, "content unchanged; dropping event");
            return false;
        }

        if let Err(e) = self.store.save(key, &hash) {
            warn!(path = %key, error = %e, "failed to store file hash");
        }
        true
    }
}
