/// Speculative execution: several coordinators race one spawn through a shared
/// arbitration slot and exactly one of them may write outputs.
mod common;

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

use common::{owner, FakeRunner, RecordingCache};
use fabrik_spawn::exec::{ArbitrationSlot, ExecutionEnvironment, SpawnCoordinator};
use fabrik_spawn::spawn::Spawn;

fn spawn() -> Spawn {
    Spawn::builder(owner())
        .args(["mytool"])
        .output("out/a.txt")
        .build()
}

#[test]
fn test_exactly_one_racer_wins() {
    let temp = TempDir::new().unwrap();
    let cache = RecordingCache::miss();
    let record = Arc::clone(&cache.record);
    let env = ExecutionEnvironment::builder(temp.path())
        .cache(Arc::new(cache))
        .build();
    let spawn = spawn();
    let slot = ArbitrationSlot::shared();

    let coordinators: Vec<SpawnCoordinator> = (0..4)
        .map(|i| {
            let name = format!("racer-{}", i);
            SpawnCoordinator::new(Arc::new(
                FakeRunner::succeeding(&name).writing("out/a.txt", &name),
            ))
        })
        .collect();

    let outcomes: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = coordinators
            .iter()
            .map(|coordinator| {
                let slot = Arc::clone(&slot);
                let (spawn, env) = (&spawn, &env);
                scope.spawn(move || coordinator.exec_speculative(spawn, env, Some(slot)))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners: Vec<_> = outcomes.iter().filter(|o| o.is_ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(outcomes
        .iter()
        .filter_map(|o| o.as_ref().err())
        .all(|e| e.is_cancellation()));

    let winner_id = slot.winner().expect("slot claimed");
    let winner = coordinators
        .iter()
        .find(|c| c.id() == winner_id)
        .expect("winner is one of the racers");
    assert_eq!(
        fs::read_to_string(temp.path().join("out/a.txt")).unwrap(),
        winner.name()
    );

    // Losers never reach the store step
    assert_eq!(record.store_count(), 1);
    assert_eq!(record.released_count(), 4);
}

#[test]
fn test_slow_racer_is_cancelled() {
    let temp = TempDir::new().unwrap();
    let env = ExecutionEnvironment::builder(temp.path()).build();
    let spawn = spawn();
    let slot = ArbitrationSlot::shared();

    let fast = SpawnCoordinator::new(Arc::new(
        FakeRunner::succeeding("fast").writing("out/a.txt", "fast"),
    ));
    let slow = SpawnCoordinator::new(Arc::new(
        FakeRunner::succeeding("slow")
            .writing("out/a.txt", "slow")
            .with_delay(Duration::from_millis(200)),
    ));

    let (fast_result, slow_result) = thread::scope(|scope| {
        let slow_handle = scope.spawn(|| slow.exec_speculative(&spawn, &env, Some(Arc::clone(&slot))));
        let fast_handle = scope.spawn(|| fast.exec_speculative(&spawn, &env, Some(Arc::clone(&slot))));
        (fast_handle.join().unwrap(), slow_handle.join().unwrap())
    });

    assert!(fast_result.is_ok());
    assert!(slow_result.unwrap_err().is_cancellation());
    assert_eq!(slot.winner(), Some(fast.id()));
    assert_eq!(
        fs::read_to_string(temp.path().join("out/a.txt")).unwrap(),
        "fast"
    );
}

#[test]
fn test_non_speculative_exec_ignores_arbitration() {
    let temp = TempDir::new().unwrap();
    let env = ExecutionEnvironment::builder(temp.path()).build();
    let first = Arc::new(FakeRunner::succeeding("local").writing("out/a.txt", "one"));
    let second = Arc::new(FakeRunner::succeeding("local").writing("out/a.txt", "two"));

    // Each run owns its outputs, so the later one overwrites the earlier
    SpawnCoordinator::new(first.clone())
        .exec(&spawn(), &env)
        .unwrap();
    assert_eq!(
        fs::read_to_string(temp.path().join("out/a.txt")).unwrap(),
        "one"
    );
    SpawnCoordinator::new(second.clone())
        .exec(&spawn(), &env)
        .unwrap();
    assert_eq!(
        fs::read_to_string(temp.path().join("out/a.txt")).unwrap(),
        "two"
    );

    assert_eq!(*first.speculating.lock().unwrap(), vec![false]);
    assert_eq!(*second.speculating.lock().unwrap(), vec![false]);
}

#[test]
fn test_racers_see_speculating_context() {
    let temp = TempDir::new().unwrap();
    let env = ExecutionEnvironment::builder(temp.path()).build();
    let runner = Arc::new(FakeRunner::succeeding("racer").writing("out/a.txt", "racer"));

    SpawnCoordinator::new(runner.clone())
        .exec_speculative(&spawn(), &env, Some(ArbitrationSlot::shared()))
        .unwrap();

    assert_eq!(*runner.speculating.lock().unwrap(), vec![true]);
}
