//! End-to-end tests: local process runner behind the on-disk spawn cache
#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use fabrik_spawn::cache::{CachePolicy, DiskSpawnCache};
use fabrik_spawn::exec::{ExecutionEnvironment, SpawnCoordinator};
use fabrik_spawn::runner::LocalSpawnRunner;
use fabrik_spawn::spawn::{ActionInput, ResourceOwner, Spawn, SpawnStatus};

struct Workspace {
    root: TempDir,
    cache_dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let ws = Self {
            root: TempDir::new().unwrap(),
            cache_dir: TempDir::new().unwrap(),
        };
        fs::create_dir_all(ws.path().join("src")).unwrap();
        fs::write(ws.path().join("src/input.txt"), "hello\n").unwrap();
        ws
    }

    fn path(&self) -> &Path {
        self.root.path()
    }

    fn cache(&self, policy: CachePolicy) -> Arc<DiskSpawnCache> {
        Arc::new(DiskSpawnCache::new(self.cache_dir.path(), policy).unwrap())
    }

    fn env(&self, cache: Arc<DiskSpawnCache>) -> ExecutionEnvironment {
        ExecutionEnvironment::builder(self.path())
            .cache(cache)
            .build()
    }

    /// Number of times a script appended to runs.log
    fn runs(&self) -> usize {
        fs::read_to_string(self.path().join("runs.log"))
            .map(|log| log.lines().count())
            .unwrap_or(0)
    }
}

fn shell_spawn(script: &str) -> Spawn {
    Spawn::builder(ResourceOwner::new("//app:upper", "Genrule"))
        .args(["sh", "-c", script])
        .env("PATH", std::env::var("PATH").unwrap_or_default())
        .input(ActionInput::file("src/input.txt"))
        .output("out/upper.txt")
        .build()
}

const UPPER: &str = "echo run >> runs.log; tr a-z A-Z < src/input.txt > out/upper.txt";

#[test]
fn test_second_run_is_served_from_cache() {
    let ws = Workspace::new();
    let cache = ws.cache(CachePolicy::default());
    let env = ws.env(cache.clone());
    let coordinator = SpawnCoordinator::new(Arc::new(LocalSpawnRunner::new()));
    let spawn = shell_spawn(UPPER);

    let first = coordinator.exec(&spawn, &env).unwrap();
    assert!(!first[0].is_cache_hit());
    assert_eq!(ws.runs(), 1);

    fs::remove_file(ws.path().join("out/upper.txt")).unwrap();

    let second = coordinator.exec(&spawn, &env).unwrap();
    assert!(second[0].is_cache_hit());
    assert_eq!(second[0].status(), SpawnStatus::Success);
    assert_eq!(ws.runs(), 1);
    assert_eq!(
        fs::read_to_string(ws.path().join("out/upper.txt")).unwrap(),
        "HELLO\n"
    );

    let stats = cache.stats().unwrap();
    assert_eq!(stats.total_entries, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.stores, 1);
}

#[test]
fn test_changed_input_misses() {
    let ws = Workspace::new();
    let coordinator = SpawnCoordinator::new(Arc::new(LocalSpawnRunner::new()));
    let spawn = shell_spawn(UPPER);

    coordinator
        .exec(&spawn, &ws.env(ws.cache(CachePolicy::default())))
        .unwrap();
    fs::write(ws.path().join("src/input.txt"), "changed\n").unwrap();

    // Fresh environment, so input digests are recomputed
    let result = coordinator
        .exec(&spawn, &ws.env(ws.cache(CachePolicy::default())))
        .unwrap();

    assert!(!result[0].is_cache_hit());
    assert_eq!(ws.runs(), 2);
    assert_eq!(
        fs::read_to_string(ws.path().join("out/upper.txt")).unwrap(),
        "CHANGED\n"
    );
}

#[test]
fn test_failures_rerun_unless_accepted() {
    let ws = Workspace::new();
    let coordinator = SpawnCoordinator::new(Arc::new(LocalSpawnRunner::new()));
    let spawn = shell_spawn("echo run >> runs.log; exit 4");

    let env = ws.env(ws.cache(CachePolicy::default()));
    for _ in 0..2 {
        let err = coordinator.exec(&spawn, &env).unwrap_err();
        assert_eq!(err.spawn_result().and_then(|r| r.exit_code()), Some(4));
    }
    assert_eq!(ws.runs(), 2);

    let env = ws.env(ws.cache(CachePolicy {
        accept_failed_results: true,
        ..Default::default()
    }));
    coordinator.exec(&spawn, &env).unwrap_err();
    let err = coordinator.exec(&spawn, &env).unwrap_err();

    // Served from cache: still a failure, but the script did not run again
    assert_eq!(ws.runs(), 3);
    assert!(err.spawn_result().unwrap().is_cache_hit());
}

#[test]
fn test_read_only_cache_never_stores() {
    let ws = Workspace::new();
    let cache = ws.cache(CachePolicy {
        read_only: true,
        ..Default::default()
    });
    let env = ws.env(cache.clone());
    let coordinator = SpawnCoordinator::new(Arc::new(LocalSpawnRunner::new()));

    coordinator.exec(&shell_spawn(UPPER), &env).unwrap();
    coordinator.exec(&shell_spawn(UPPER), &env).unwrap();

    assert_eq!(ws.runs(), 2);
    assert!(cache.list().unwrap().is_empty());
}
