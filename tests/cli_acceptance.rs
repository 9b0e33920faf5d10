//! Acceptance tests for the fabrik-spawn binary
//!
//! Each test runs in its own workspace with its own cache directory and an
//! empty XDG config home, so no user configuration leaks in.
#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

struct TestWorkspace {
    root: TempDir,
    cache_dir: TempDir,
    config_home: TempDir,
}

impl TestWorkspace {
    fn new() -> Self {
        let ws = Self {
            root: TempDir::new().unwrap(),
            cache_dir: TempDir::new().unwrap(),
            config_home: TempDir::new().unwrap(),
        };
        fs::write(ws.path().join("input.txt"), "spawn\n").unwrap();
        ws
    }

    fn path(&self) -> &Path {
        self.root.path()
    }

    fn fabrik_spawn(&self) -> Command {
        let mut cmd = Command::new(std::env!("CARGO_BIN_EXE_fabrik-spawn"));
        cmd.current_dir(self.path())
            .env("FABRIK_CONFIG_CACHE_DIR", self.cache_dir.path())
            .env("XDG_CONFIG_HOME", self.config_home.path())
            .env("FABRIK_LOG_FORMAT", "compact")
            .env_remove("FABRIK_CONFIG")
            .env_remove("FABRIK_EXEC_ROOT")
            .env_remove("RUST_LOG");
        cmd
    }

    fn exec(&self, script: &str) -> Command {
        let mut cmd = self.fabrik_spawn();
        cmd.args([
            "exec",
            "--pass-env",
            "PATH",
            "-i",
            "input.txt",
            "-o",
            "out/result.txt",
            "--",
            "sh",
            "-c",
            script,
        ]);
        cmd
    }
}

const COPY: &str = "echo run >> runs.log; mkdir -p out; cat input.txt > out/result.txt";

#[test]
fn test_exec_runs_then_hits_cache() {
    let ws = TestWorkspace::new();

    ws.exec(COPY)
        .assert()
        .success()
        .stderr(predicate::str::contains("Completed in"));
    assert_eq!(
        fs::read_to_string(ws.path().join("out/result.txt")).unwrap(),
        "spawn\n"
    );

    fs::remove_file(ws.path().join("out/result.txt")).unwrap();

    ws.exec(COPY)
        .assert()
        .success()
        .stderr(predicate::str::contains("Cache HIT"));
    assert_eq!(
        fs::read_to_string(ws.path().join("out/result.txt")).unwrap(),
        "spawn\n"
    );
    assert_eq!(
        fs::read_to_string(ws.path().join("runs.log"))
            .unwrap()
            .lines()
            .count(),
        1
    );
}

#[test]
fn test_no_cache_always_runs() {
    let ws = TestWorkspace::new();

    for _ in 0..2 {
        ws.fabrik_spawn()
            .args(["exec", "--no-cache", "--pass-env", "PATH", "--"])
            .args(["sh", "-c", "echo run >> runs.log"])
            .assert()
            .success();
    }

    let runs = fs::read_to_string(ws.path().join("runs.log")).unwrap();
    assert_eq!(runs.lines().count(), 2);
}

#[test]
fn test_failing_command_propagates_exit_code() {
    let ws = TestWorkspace::new();

    ws.exec("exit 3")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("error executing command sh -c"));
}

#[test]
fn test_timeout_is_enforced() {
    let ws = TestWorkspace::new();

    let mut cmd = ws.fabrik_spawn();
    cmd.args(["exec", "--timeout", "1s", "--", "sh", "-c", "sleep 10"]);
    cmd.assert().failure();
}

#[test]
fn test_cache_list_stats_and_clean() {
    let ws = TestWorkspace::new();
    ws.exec(COPY).assert().success();

    ws.fabrik_spawn()
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total entries: 1"));

    ws.fabrik_spawn()
        .args(["cache", "list", "--verbose"])
        .assert()
        .success()
        .stdout(predicate::str::contains("spawn-"))
        .stdout(predicate::str::contains("out/result.txt"));

    ws.fabrik_spawn()
        .args(["cache", "clean", "--all"])
        .assert()
        .success();

    ws.fabrik_spawn()
        .args(["cache", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No cached spawns."));
}

#[test]
fn test_config_example_validates() {
    let ws = TestWorkspace::new();

    let output = ws
        .fabrik_spawn()
        .args(["config", "example"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[cache]"))
        .get_output()
        .stdout
        .clone();

    let config_path = ws.path().join("fabrik-spawn.toml");
    fs::write(&config_path, output).unwrap();

    ws.fabrik_spawn()
        .args(["config", "validate"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file is valid"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let ws = TestWorkspace::new();
    let config_path = ws.path().join("broken.toml");
    fs::write(&config_path, "[cache]\nttl = \"forever\"\n").unwrap();

    ws.fabrik_spawn()
        .args(["config", "validate"])
        .arg(&config_path)
        .assert()
        .failure();
}
