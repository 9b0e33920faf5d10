// Recording fakes shared across integration tests
//
// FakeRunner and RecordingCache stand in for the execution backend and the
// spawn cache. Both record every interaction so tests can assert on the
// protocol the coordinator follows, not just on its return value.

#![allow(dead_code)]

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fabrik_spawn::cache::{CacheError, CacheHandle, SpawnCache};
use fabrik_spawn::exec::{AttemptContext, ExecError};
use fabrik_spawn::runner::SpawnRunner;
use fabrik_spawn::spawn::{ResourceOwner, Spawn, SpawnResult};

pub fn owner() -> ResourceOwner {
    ResourceOwner::new("//app:gen", "Genrule")
}

/// What the fake runner does once it owns the outputs
#[derive(Clone)]
pub enum Behavior {
    Return(SpawnResult),
    FailWith(io::ErrorKind),
}

/// Runner that writes configured files and returns a configured result
pub struct FakeRunner {
    name: String,
    behavior: Behavior,
    writes: Vec<(PathBuf, String)>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub timeouts: Mutex<Vec<Duration>>,
    /// `AttemptContext::speculating` as seen by each call
    pub speculating: Mutex<Vec<bool>>,
}

impl FakeRunner {
    pub fn new(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            writes: Vec::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            timeouts: Mutex::new(Vec::new()),
            speculating: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(name: &str) -> Self {
        Self::new(name, Behavior::Return(SpawnResult::success(name)))
    }

    /// Write `content` to `path` (relative to the exec root) after locking outputs
    pub fn writing(mut self, path: &str, content: &str) -> Self {
        self.writes.push((PathBuf::from(path), content.to_string()));
        self
    }

    /// Sleep before claiming outputs
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SpawnRunner for FakeRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn exec(&self, _spawn: &Spawn, context: &AttemptContext<'_>) -> Result<SpawnResult, ExecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.timeouts.lock().unwrap().push(context.timeout());
        self.speculating.lock().unwrap().push(context.speculating());

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        context.lock_output_files()?;

        for (path, content) in &self.writes {
            let target = context.exec_root().join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, content)?;
        }

        match &self.behavior {
            Behavior::Return(result) => Ok(result.clone()),
            Behavior::FailWith(kind) => Err(io::Error::new(*kind, "backend failure").into()),
        }
    }
}

/// Everything a RecordingCache saw
#[derive(Default)]
pub struct CacheRecord {
    pub lookups: AtomicUsize,
    pub released: AtomicUsize,
    pub stores: Mutex<Vec<(SpawnResult, Vec<PathBuf>)>>,
}

impl CacheRecord {
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn store_count(&self) -> usize {
        self.stores.lock().unwrap().len()
    }
}

/// Cache whose answers are fixed up front
pub struct RecordingCache {
    /// `Some(Some(r))` = hit with `r`; `Some(None)` = hit without a result
    hit: Option<Option<SpawnResult>>,
    will_store: bool,
    fail_lookup: bool,
    fail_store: bool,
    pub record: Arc<CacheRecord>,
}

impl RecordingCache {
    pub fn miss() -> Self {
        Self {
            hit: None,
            will_store: true,
            fail_lookup: false,
            fail_store: false,
            record: Arc::new(CacheRecord::default()),
        }
    }

    pub fn hit(result: SpawnResult) -> Self {
        Self {
            hit: Some(Some(result)),
            ..Self::miss()
        }
    }

    pub fn hit_without_result() -> Self {
        Self {
            hit: Some(None),
            ..Self::miss()
        }
    }

    pub fn not_storing(mut self) -> Self {
        self.will_store = false;
        self
    }

    pub fn failing_lookup(mut self) -> Self {
        self.fail_lookup = true;
        self
    }

    pub fn failing_store(mut self) -> Self {
        self.fail_store = true;
        self
    }
}

impl SpawnCache for RecordingCache {
    fn lookup(
        &self,
        _spawn: &Spawn,
        _context: &AttemptContext<'_>,
    ) -> Result<Box<dyn CacheHandle>, CacheError> {
        self.record.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookup {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "cache down").into());
        }
        Ok(Box::new(RecordingHandle {
            hit: self.hit.clone(),
            will_store: self.will_store,
            fail_store: self.fail_store,
            record: Arc::clone(&self.record),
        }))
    }
}

struct RecordingHandle {
    hit: Option<Option<SpawnResult>>,
    will_store: bool,
    fail_store: bool,
    record: Arc<CacheRecord>,
}

impl CacheHandle for RecordingHandle {
    fn has_result(&self) -> bool {
        self.hit.is_some()
    }

    fn result(&self) -> Option<SpawnResult> {
        self.hit.clone().flatten()
    }

    fn will_store(&self) -> bool {
        self.will_store
    }

    fn store(&mut self, result: &SpawnResult, existing_outputs: &[PathBuf]) -> io::Result<()> {
        if self.fail_store {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        self.record
            .stores
            .lock()
            .unwrap()
            .push((result.clone(), existing_outputs.to_vec()));
        Ok(())
    }
}

impl Drop for RecordingHandle {
    fn drop(&mut self) {
        self.record.released.fetch_add(1, Ordering::SeqCst);
    }
}
