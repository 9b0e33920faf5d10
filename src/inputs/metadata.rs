/// Digesting file identity cache
///
/// Hashes each input once (SHA-256 over content) and memoizes the result per
/// exec path for the lifetime of the cache.
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::InputMetadataProvider;
use crate::spawn::ActionInput;

/// Identity of one input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub size: u64,
    /// Hex-encoded SHA-256 of the content; empty for directories
    pub digest: String,
    pub is_directory: bool,
}

/// Memoizing [`InputMetadataProvider`] rooted at the exec root
pub struct DigestingMetadataCache {
    exec_root: PathBuf,
    entries: Mutex<HashMap<PathBuf, FileMetadata>>,
}

impl DigestingMetadataCache {
    pub fn new(exec_root: impl Into<PathBuf>) -> Self {
        Self {
            exec_root: exec_root.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Forget a cached entry (e.g. after a file was rewritten)
    pub fn invalidate(&self, exec_path: &Path) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(exec_path);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn compute(&self, path: &Path) -> io::Result<FileMetadata> {
        let meta = fs::metadata(path)?;
        if meta.is_dir() {
            return Ok(FileMetadata {
                size: 0,
                digest: String::new(),
                is_directory: true,
            });
        }

        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)?;

        Ok(FileMetadata {
            size: meta.len(),
            digest: hex::encode(hasher.finalize()),
            is_directory: false,
        })
    }
}

impl InputMetadataProvider for DigestingMetadataCache {
    fn metadata(&self, input: &ActionInput) -> io::Result<FileMetadata> {
        if let Some(found) = self
            .entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(&input.exec_path).cloned())
        {
            return Ok(found);
        }

        let path = self.exec_root.join(&input.exec_path);
        let metadata = self.compute(&path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("Failed to read input {}: {}", input.exec_path.display(), e),
            )
        })?;

        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(input.exec_path.clone(), metadata.clone());
        }

        Ok(metadata)
    }
}
