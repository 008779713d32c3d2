// src/watch/hash.rs

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::{debug, info};

/// Relative path (from the project root) to the hashes file.
///
/// The effective path on disk is `<project>/.sitepipe/hashes`.
pub const HASH_FILE_PATH: &str = ".sitepipe/hashes";

fn hash_file_path(root: &Path) -> PathBuf {
    root.join(HASH_FILE_PATH)
}

/// Compute the blake3 hash of a single file.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file =
        File::open(path).with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Abstract storage for per-file content hashes, keyed by source-relative
/// path.
pub trait HashStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&mut self, key: &str, hash: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Stores hashes in a file (`.sitepipe/hashes`).
///
/// The file is read once on construction and rewritten on every change.
pub struct FileHashStore {
    root: PathBuf,
    map: HashMap<String, String>,
}

impl FileHashStore {
    pub fn open(root: PathBuf) -> Result<Self> {
        let map = load_all_hashes(&root)?;
        debug!(entries = map.len(), "loaded stored file hashes");
        Ok(Self { root, map })
    }
}

impl HashStore for FileHashStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.get(key).cloned())
    }

    fn save(&mut self, key: &str, hash: &str) -> Result<()> {
        self.map.insert(key.to_string(), hash.to_string());
        save_all_hashes(&self.root, &self.map)?;
        debug!(path = %key, hash = %hash, "stored file hash (file)");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.map.remove(key).is_some() {
            save_all_hashes(&self.root, &self.map)?;
        }
        Ok(())
    }
}

/// Stores hashes in memory only.
#[derive(Debug, Default)]
pub struct MemoryHashStore {
    map: HashMap<String, String>,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HashStore for MemoryHashStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.get(key).cloned())
    }

    fn save(&mut self, key: &str, hash: &str) -> Result<()> {
        self.map.insert(key.to_string(), hash.to_string());
        debug!(path = %key, hash = %hash, "stored file hash (memory)");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.map.remove(key);
        Ok(())
    }
}

/// Load all stored hashes from `<root>/.sitepipe/hashes`.
///
/// Each line is `<hash> <path>`; the path may contain spaces.
fn load_all_hashes(root: &Path) -> Result<HashMap<String, String>> {
    let path = hash_file_path(root);

    if !path.exists() {
        return Ok(HashMap::new());
    }

    let file = File::open(&path).with_context(|| format!("opening hash file at {:?}", path))?;
    let reader = BufReader::new(file);

    let mut map = HashMap::new();

    for line_res in reader.lines() {
        let line = line_res?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some((hash, key)) = trimmed.split_once(' ') {
            map.insert(key.to_string(), hash.to_string());
        }
    }

    info!(path = %path.display(), entries = map.len(), "read hash file");
    Ok(map)
}

/// Persist all hashes to `<root>/.sitepipe/hashes`, sorted by path.
fn save_all_hashes(root: &Path, map: &HashMap<String, String>) -> Result<()> {
    let path = hash_file_path(root);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating hash directory at {:?}", parent))?;
    }

    let file = File::create(&path).with_context(|| format!("creating hash file at {:?}", path))?;
    let mut writer = BufWriter::new(file);

    let mut entries: Vec<_> = map.iter().collect();
    entries.sort();
    for (key, hash) in entries {
        writeln!(writer, "{} {}", hash, key)?;
    }

    writer.flush()?;
    Ok(())
}
