//! Spawn result caching
//!
//! The coordinator talks to a cache through two traits:
//!
//! - [`SpawnCache::lookup`] returns a [`CacheHandle`] for one spawn
//! - the handle answers whether a result was found and optionally stores the
//!   result of a fresh execution
//!
//! Handles are released when dropped, on every exit path.
//!
//! ## Implementations
//!
//! - [`NoSpawnCache`]: always misses, never stores
//! - [`DiskSpawnCache`]: entries on the local filesystem

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::exec::{AttemptContext, ExecError, LostRace};
use crate::spawn::{Spawn, SpawnResult};

mod disk;
mod key;

pub use disk::{CacheEntry, CacheStats, DiskSpawnCache, EntryMetadata, StoredOutput};
pub use key::compute_cache_key;

/// Failure while looking up a spawn
#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Restoring a hit required locking outputs and another attempt owns them
    #[error(transparent)]
    Cancelled(#[from] LostRace),
}

impl From<CacheError> for ExecError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Io(e) => ExecError::environmental(e),
            CacheError::Cancelled(lost) => ExecError::Cancelled(lost),
        }
    }
}

/// Cache of spawn results
pub trait SpawnCache: Send + Sync {
    fn lookup(
        &self,
        spawn: &Spawn,
        context: &AttemptContext<'_>,
    ) -> Result<Box<dyn CacheHandle>, CacheError>;
}

/// One cache interaction for one spawn; released on drop
pub trait CacheHandle {
    fn has_result(&self) -> bool;

    /// The cached result; must be `Some` whenever `has_result` is true
    fn result(&self) -> Option<SpawnResult>;

    /// Whether the result of executing the spawn should be stored
    fn will_store(&self) -> bool;

    /// Store a result together with the declared outputs that exist on disk
    fn store(&mut self, result: &SpawnResult, existing_outputs: &[PathBuf]) -> io::Result<()>;
}

/// What a cache accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CachePolicy {
    /// Serve hits but never store
    pub read_only: bool,
    /// Store results whose status is not `Success`
    pub accept_failed_results: bool,
}

/// Cache used when the environment has none: always misses, never stores
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSpawnCache;

struct NoCacheHandle;

impl SpawnCache for NoSpawnCache {
    fn lookup(
        &self,
        _spawn: &Spawn,
        _context: &AttemptContext<'_>,
    ) -> Result<Box<dyn CacheHandle>, CacheError> {
        Ok(Box::new(NoCacheHandle))
    }
}

impl CacheHandle for NoCacheHandle {
    fn has_result(&self) -> bool {
        false
    }

    fn result(&self) -> Option<SpawnResult> {
        None
    }

    fn will_store(&self) -> bool {
        false
    }

    fn store(&mut self, _result: &SpawnResult, _existing_outputs: &[PathBuf]) -> io::Result<()> {
        Ok(())
    }
}
