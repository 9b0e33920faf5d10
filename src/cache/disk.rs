/// On-disk spawn cache
///
/// Layout:
/// - `<dir>/spawns/<key>/metadata.json` - entry metadata and the cached `SpawnResult`
/// - `<dir>/spawns/<key>/outputs/<exec_path>` - copies of the produced outputs
/// - `<dir>/spawns/.staging-*` - entries being written; renamed into place when complete
///
/// A lookup never observes a half-written entry: stores are staged in a
/// separate directory and renamed into place in one step. A complete entry is
/// never replaced, so the first store of a key wins. Stale entries are renamed
/// aside before they are deleted.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{compute_cache_key, CacheError, CacheHandle, CachePolicy, SpawnCache};
use crate::exec::AttemptContext;
use crate::logging::{operations, services, status};
use crate::spawn::{Spawn, SpawnResult};

const METADATA_VERSION: u32 = 1;
const METADATA_FILE: &str = "metadata.json";
const OUTPUTS_DIR: &str = "outputs";
const STAGING_PREFIX: &str = ".staging-";

/// Names for entries moved aside before deletion
static DISCARD_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Output file recorded in a cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOutput {
    /// Path relative to the exec root
    pub path: String,
    pub size_bytes: u64,
}

/// Cache entry metadata (`metadata.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub version: u32,
    pub cache_key: String,
    pub label: String,
    pub mnemonic: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub result: SpawnResult,
    pub outputs: Vec<StoredOutput>,
}

/// Cache entry with metadata and its directory
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub metadata: EntryMetadata,
    pub entry_dir: PathBuf,
}

impl CacheEntry {
    fn output_path(&self, output: &StoredOutput) -> PathBuf {
        self.entry_dir.join(OUTPUTS_DIR).join(&output.path)
    }

    /// Every recorded output is present
    pub fn is_complete(&self) -> bool {
        self.metadata
            .outputs
            .iter()
            .all(|output| self.output_path(output).is_file())
    }

    pub fn is_expired(&self) -> bool {
        is_expired(&self.metadata)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub total_files: usize,
    /// Lookups served by this instance
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
}

/// Filesystem backed [`SpawnCache`]
pub struct DiskSpawnCache {
    cache_dir: PathBuf,
    policy: CachePolicy,
    ttl: Option<Duration>,
    counters: Arc<Counters>,
}

impl DiskSpawnCache {
    /// Create a cache under `cache_dir` (entries live in `cache_dir/spawns`)
    pub fn new(cache_dir: impl AsRef<Path>, policy: CachePolicy) -> io::Result<Self> {
        let spawn_cache_dir = cache_dir.as_ref().join("spawns");
        fs::create_dir_all(&spawn_cache_dir)
            .map_err(|e| annotate(e, "Failed to create cache directory", &spawn_cache_dir))?;

        Ok(Self {
            cache_dir: spawn_cache_dir,
            policy,
            ttl: None,
            counters: Arc::new(Counters::default()),
        })
    }

    /// Expire entries `ttl` after they were stored
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl.filter(|ttl| !ttl.is_zero());
        self
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Whether a (possibly stale) entry directory exists for `cache_key`
    pub fn contains(&self, cache_key: &str) -> bool {
        is_entry_name(cache_key) && self.cache_dir.join(cache_key).is_dir()
    }

    /// Read an entry's metadata as stored, without validating or expiring it
    pub fn read_entry(&self, cache_key: &str) -> io::Result<Option<CacheEntry>> {
        if !is_entry_name(cache_key) {
            return Ok(None);
        }
        let entry_dir = self.cache_dir.join(cache_key);
        let metadata_path = entry_dir.join(METADATA_FILE);

        let metadata_json = match fs::read_to_string(&metadata_path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(annotate(e, "Failed to read metadata", &metadata_path)),
        };

        match serde_json::from_str::<EntryMetadata>(&metadata_json) {
            Ok(metadata) => Ok(Some(CacheEntry {
                metadata,
                entry_dir,
            })),
            Err(e) => {
                debug!(
                    service = services::SPAWN_CACHE,
                    cache_key = cache_key,
                    "Unreadable cache metadata: {}",
                    e
                );
                Ok(None)
            }
        }
    }

    /// Get cache entry if it exists, is complete and is not expired
    ///
    /// Entries failing any of those checks are discarded.
    pub fn get(&self, cache_key: &str) -> io::Result<Option<CacheEntry>> {
        if !is_entry_name(cache_key) {
            return Ok(None);
        }
        let entry_dir = self.cache_dir.join(cache_key);

        let Some(entry) = self.read_entry(cache_key)? else {
            if entry_dir.join(METADATA_FILE).exists() {
                warn!(
                    service = services::SPAWN_CACHE,
                    cache_key = cache_key,
                    "Discarding unreadable cache entry"
                );
                self.discard(&entry_dir)?;
            }
            return Ok(None);
        };

        if is_expired(&entry.metadata) || !entry.is_complete() {
            debug!(
                service = services::SPAWN_CACHE,
                cache_key = cache_key,
                "Discarding expired or incomplete cache entry"
            );
            self.discard(&entry_dir)?;
            return Ok(None);
        }

        Ok(Some(entry))
    }

    /// Remove cache entry
    pub fn remove(&self, cache_key: &str) -> io::Result<()> {
        if !is_entry_name(cache_key) {
            return Ok(());
        }
        self.discard(&self.cache_dir.join(cache_key))
    }

    fn discard(&self, entry_dir: &Path) -> io::Result<()> {
        discard_entry(&self.cache_dir, entry_dir)
    }

    /// List all cache entry keys, sorted
    pub fn list(&self) -> io::Result<Vec<String>> {
        let mut entries = Vec::new();

        for entry in fs::read_dir(&self.cache_dir)
            .map_err(|e| annotate(e, "Failed to read cache directory", &self.cache_dir))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with(STAGING_PREFIX) {
                    entries.push(name.to_string());
                }
            }
        }

        entries.sort();
        Ok(entries)
    }

    /// Get cache statistics
    pub fn stats(&self) -> io::Result<CacheStats> {
        let mut stats = CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            ..CacheStats::default()
        };

        for key in self.list()? {
            stats.total_entries += 1;

            if let Some(metadata) = read_metadata(&self.cache_dir.join(&key)) {
                for output in &metadata.outputs {
                    stats.total_size_bytes += output.size_bytes;
                    stats.total_files += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Clean all cache entries
    pub fn clean_all(&self) -> io::Result<()> {
        if self.cache_dir.exists() {
            fs::remove_dir_all(&self.cache_dir)
                .map_err(|e| annotate(e, "Failed to remove cache directory", &self.cache_dir))?;
        }
        fs::create_dir_all(&self.cache_dir)
            .map_err(|e| annotate(e, "Failed to recreate cache directory", &self.cache_dir))
    }

    /// Copy the outputs of a hit back into the exec root
    ///
    /// Every output is copied next to its destination first and only renamed
    /// into place once all copies succeeded, so a failed restore writes nothing.
    fn restore_outputs(
        &self,
        entry: &CacheEntry,
        exec_root: &Path,
        attempt: u64,
    ) -> io::Result<()> {
        let mut staged: Vec<(PathBuf, PathBuf)> =
            Vec::with_capacity(entry.metadata.outputs.len());

        for output in &entry.metadata.outputs {
            let dest = exec_root.join(&output.path);
            let temp = restore_temp_path(&dest, attempt);
            let copied = dest
                .parent()
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|()| fs::copy(entry.output_path(output), &temp));

            if let Err(e) = copied {
                let _ = fs::remove_file(&temp);
                for (temp, _) in &staged {
                    let _ = fs::remove_file(temp);
                }
                return Err(annotate(e, "Failed to restore output", &dest));
            }
            staged.push((temp, dest));
        }

        for (temp, dest) in &staged {
            fs::rename(temp, dest).map_err(|e| annotate(e, "Failed to restore output", dest))?;
        }
        Ok(())
    }
}

impl SpawnCache for DiskSpawnCache {
    fn lookup(
        &self,
        spawn: &Spawn,
        context: &AttemptContext<'_>,
    ) -> Result<Box<dyn CacheHandle>, CacheError> {
        let cache_key = compute_cache_key(spawn, context)?;
        let exec_root = context.exec_root().to_path_buf();

        if let Some(entry) = self.get(&cache_key)? {
            // Restoring writes declared outputs
            context.lock_output_files()?;
            match self.restore_outputs(&entry, &exec_root, context.id()) {
                Ok(()) => {}
                // Discarded between reading metadata and copying outputs
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(
                        service = services::SPAWN_CACHE,
                        cache_key = %cache_key,
                        "cache entry vanished during restore: {}",
                        e
                    );
                    return Ok(self.miss_handle(spawn, context, cache_key, exec_root));
                }
                Err(e) => return Err(e.into()),
            }
            self.counters.hits.fetch_add(1, Ordering::Relaxed);

            info!(
                service = services::SPAWN_CACHE,
                operation = operations::GET,
                status = status::SUCCESS,
                cache_key = %cache_key,
                attempt = context.id(),
                entry_count = entry.metadata.outputs.len(),
                "cache hit"
            );

            return Ok(Box::new(DiskCacheHandle {
                cache_key,
                result: Some(entry.metadata.result.into_cache_hit()),
                will_store: false,
                cache_dir: self.cache_dir.clone(),
                exec_root,
                policy: self.policy,
                ttl: self.ttl,
                label: spawn.resource_owner().label.clone(),
                mnemonic: spawn.resource_owner().mnemonic.clone(),
                staging: staging_dir(&self.cache_dir, context.id()),
                counters: Arc::clone(&self.counters),
            }));
        }

        Ok(self.miss_handle(spawn, context, cache_key, exec_root))
    }
}

impl DiskSpawnCache {
    fn miss_handle(
        &self,
        spawn: &Spawn,
        context: &AttemptContext<'_>,
        cache_key: String,
        exec_root: PathBuf,
    ) -> Box<dyn CacheHandle> {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(
            service = services::SPAWN_CACHE,
            operation = operations::GET,
            status = status::MISS,
            cache_key = %cache_key,
            attempt = context.id(),
            "cache miss"
        );

        Box::new(DiskCacheHandle {
            cache_key,
            result: None,
            will_store: !self.policy.read_only,
            cache_dir: self.cache_dir.clone(),
            exec_root,
            policy: self.policy,
            ttl: self.ttl,
            label: spawn.resource_owner().label.clone(),
            mnemonic: spawn.resource_owner().mnemonic.clone(),
            staging: staging_dir(&self.cache_dir, context.id()),
            counters: Arc::clone(&self.counters),
        })
    }
}

struct DiskCacheHandle {
    cache_key: String,
    result: Option<SpawnResult>,
    will_store: bool,
    cache_dir: PathBuf,
    exec_root: PathBuf,
    policy: CachePolicy,
    ttl: Option<Duration>,
    label: String,
    mnemonic: String,
    staging: PathBuf,
    counters: Arc<Counters>,
}

impl DiskCacheHandle {
    /// Copy outputs into the staging directory, expanding directories
    fn stage_outputs(&self, existing_outputs: &[PathBuf]) -> io::Result<Vec<StoredOutput>> {
        let outputs_dir = self.staging.join(OUTPUTS_DIR);
        let mut stored = Vec::new();

        for output in existing_outputs {
            for entry in WalkDir::new(output).sort_by_file_name() {
                let entry = entry.map_err(io::Error::from)?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry.path().strip_prefix(&self.exec_root).map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("Output outside exec root: {}", entry.path().display()),
                    )
                })?;

                let dest = outputs_dir.join(relative);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                let size_bytes = fs::copy(entry.path(), &dest)
                    .map_err(|e| annotate(e, "Failed to copy output", entry.path()))?;

                stored.push(StoredOutput {
                    path: relative.to_string_lossy().to_string(),
                    size_bytes,
                });
            }
        }

        Ok(stored)
    }
}

impl CacheHandle for DiskCacheHandle {
    fn has_result(&self) -> bool {
        self.result.is_some()
    }

    fn result(&self) -> Option<SpawnResult> {
        self.result.clone()
    }

    fn will_store(&self) -> bool {
        self.will_store
    }

    fn store(&mut self, result: &SpawnResult, existing_outputs: &[PathBuf]) -> io::Result<()> {
        if !result.status().is_success() && !self.policy.accept_failed_results {
            debug!(
                service = services::SPAWN_CACHE,
                operation = operations::PUT,
                cache_key = %self.cache_key,
                spawn_status = %result.status(),
                "not caching failed result"
            );
            return Ok(());
        }

        fs::create_dir_all(&self.staging)
            .map_err(|e| annotate(e, "Failed to create staging directory", &self.staging))?;

        let outputs = self.stage_outputs(existing_outputs)?;

        let created_at = Utc::now();
        let expires_at = self
            .ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| created_at + ttl);

        let metadata = EntryMetadata {
            version: METADATA_VERSION,
            cache_key: self.cache_key.clone(),
            label: self.label.clone(),
            mnemonic: self.mnemonic.clone(),
            created_at,
            expires_at,
            result: result.clone(),
            outputs,
        };

        let metadata_json = serde_json::to_string_pretty(&metadata)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(self.staging.join(METADATA_FILE), metadata_json)?;

        let entry_dir = self.cache_dir.join(&self.cache_key);
        if let Some(existing) = read_metadata(&entry_dir) {
            if !is_expired(&existing) {
                debug!(
                    service = services::SPAWN_CACHE,
                    operation = operations::PUT,
                    cache_key = %self.cache_key,
                    "entry already stored, keeping it"
                );
                return Ok(());
            }
        }
        if entry_dir.exists() {
            discard_entry(&self.cache_dir, &entry_dir)?;
        }
        if let Err(e) = fs::rename(&self.staging, &entry_dir) {
            // A concurrent store of the same key got there first
            if entry_dir.join(METADATA_FILE).exists() {
                debug!(cache_key = %self.cache_key, "entry stored concurrently: {}", e);
                return Ok(());
            }
            return Err(annotate(e, "Failed to commit cache entry", &entry_dir));
        }

        self.counters.stores.fetch_add(1, Ordering::Relaxed);
        info!(
            service = services::SPAWN_CACHE,
            operation = operations::PUT,
            status = status::SUCCESS,
            cache_key = %self.cache_key,
            entry_count = metadata.outputs.len(),
            "stored spawn result"
        );

        Ok(())
    }
}

impl Drop for DiskCacheHandle {
    fn drop(&mut self) {
        // Abandoned or half-written stores never become visible
        if self.staging.exists() {
            if let Err(e) = fs::remove_dir_all(&self.staging) {
                warn!(
                    service = services::SPAWN_CACHE,
                    "Failed to remove staging directory {}: {}",
                    self.staging.display(),
                    e
                );
            }
        }
    }
}

fn staging_dir(cache_dir: &Path, attempt: u64) -> PathBuf {
    cache_dir.join(format!(
        "{}{}-{}",
        STAGING_PREFIX,
        std::process::id(),
        attempt
    ))
}

/// Move an entry aside under a staging name, then delete it
///
/// Lookups see either the whole entry or none of it.
fn discard_entry(cache_dir: &Path, entry_dir: &Path) -> io::Result<()> {
    let aside = cache_dir.join(format!(
        "{}{}-discard-{}",
        STAGING_PREFIX,
        std::process::id(),
        DISCARD_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    match fs::rename(entry_dir, &aside) {
        Ok(()) => {}
        // Already discarded elsewhere
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(annotate(e, "Failed to remove cache entry", entry_dir)),
    }
    fs::remove_dir_all(&aside).map_err(|e| annotate(e, "Failed to remove cache entry", &aside))
}

fn read_metadata(entry_dir: &Path) -> Option<EntryMetadata> {
    let json = fs::read_to_string(entry_dir.join(METADATA_FILE)).ok()?;
    serde_json::from_str(&json).ok()
}

fn is_expired(metadata: &EntryMetadata) -> bool {
    metadata
        .expires_at
        .is_some_and(|expires_at| Utc::now() > expires_at)
}

/// Keys name a directory directly under the cache dir, never staging
fn is_entry_name(cache_key: &str) -> bool {
    !cache_key.is_empty()
        && !cache_key.starts_with('.')
        && !cache_key.contains(['/', '\\'])
}

/// Sibling of `dest` that a restore copies into before renaming
fn restore_temp_path(dest: &Path, attempt: u64) -> PathBuf {
    let name = dest
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(
        ".{}.restore-{}-{}",
        name,
        std::process::id(),
        attempt
    ))
}

fn annotate(err: io::Error, what: &str, path: &Path) -> io::Error {
    io::Error::new(err.kind(), format!("{}: {}: {}", what, path.display(), err))
}
