/// `fabrik-spawn exec` command implementation
///
/// Builds a spawn from the command line, wires the local runner and the disk
/// cache into an execution environment and runs it through the coordinator.
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::cache::DiskSpawnCache;
use crate::cli::ExecArgs;
use crate::cli_utils::prefix;
use crate::config::SpawnConfig;
use crate::events::LoggingEventSink;
use crate::exec::{ExecError, ExecutionEnvironment, OutErr, OutputSink, SpawnCoordinator};
use crate::inputs::WarmingPrefetcher;
use crate::merger::MergedExecConfig;
use crate::runner::LocalSpawnRunner;
use crate::spawn::{ActionInput, ResourceOwner, Spawn, DISABLE_LOCAL_PREFETCH_KEY};

/// Run the command; returns the process exit code
pub fn run(args: ExecArgs, file_config: Option<SpawnConfig>) -> Result<i32> {
    let config = MergedExecConfig::merge(&args, file_config)?;

    let exec_root = config.exec_root.canonicalize().with_context(|| {
        format!(
            "Failed to resolve exec root: {}",
            config.exec_root.display()
        )
    })?;

    let spawn = build_spawn(&args, &config)?;
    let env = build_environment(&args, &config, &exec_root)?;

    let coordinator =
        SpawnCoordinator::new(Arc::new(LocalSpawnRunner::with_name(&config.strategy)))
            .with_default_timeout(config.default_timeout);

    debug!("Executing {} in {}", spawn.command_line(), exec_root.display());

    match coordinator.exec(&spawn, &env) {
        Ok(results) => {
            for result in &results {
                if result.is_cache_hit() {
                    eprintln!("{} Cache HIT ✓ (outputs restored)", prefix());
                } else if let Some(wall_time) = result.wall_time() {
                    eprintln!(
                        "{} Completed in {:.2}s",
                        prefix(),
                        wall_time.as_secs_f64()
                    );
                }
            }
            Ok(0)
        }
        Err(ExecError::SpawnFailed { message, result }) => {
            eprintln!("{} {}", prefix(), message);
            Ok(result.exit_code().filter(|code| *code > 0).unwrap_or(1))
        }
        Err(e) => Err(e).context("Spawn execution failed"),
    }
}

fn build_spawn(args: &ExecArgs, config: &MergedExecConfig) -> Result<Spawn> {
    let mut builder = Spawn::builder(ResourceOwner::new(&args.label, &args.mnemonic))
        .args(args.command.iter().cloned());

    for name in &args.pass_env {
        if let Ok(value) = std::env::var(name) {
            builder = builder.env(name, value);
        }
    }
    for (key, value) in &args.env {
        builder = builder.env(key, value);
    }

    for input in &args.inputs {
        builder = builder.input(ActionInput::file(input));
    }
    for tree in &args.trees {
        builder = builder.input(ActionInput::tree(tree));
    }
    for (path, pattern) in &args.filesets {
        builder = builder.input(ActionInput::fileset(path, pattern));
    }
    for output in &args.outputs {
        builder = builder.output(output);
    }

    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    if args.no_prefetch {
        builder = builder.execution_info(DISABLE_LOCAL_PREFETCH_KEY, "");
    }

    Ok(builder.build())
}

fn build_environment(
    args: &ExecArgs,
    config: &MergedExecConfig,
    exec_root: &Path,
) -> Result<ExecutionEnvironment> {
    let out_err = OutErr {
        stdout: args
            .stdout
            .clone()
            .map(OutputSink::File)
            .unwrap_or(OutputSink::Inherit),
        stderr: args
            .stderr
            .clone()
            .map(OutputSink::File)
            .unwrap_or(OutputSink::Inherit),
    };

    let mut builder = ExecutionEnvironment::builder(exec_root)
        .events(Arc::new(LoggingEventSink))
        .verbose_failures(config.verbose_failures)
        .report_subcommands(config.report_subcommands)
        .out_err(out_err)
        .prefetcher(Arc::new(WarmingPrefetcher::new(exec_root)));

    if config.cache_enabled {
        let cache = DiskSpawnCache::new(&config.cache_dir, config.cache_policy)
            .with_context(|| {
                format!(
                    "Failed to initialize spawn cache at {}",
                    config.cache_dir.display()
                )
            })?
            .with_ttl(config.cache_ttl);
        debug!("Using spawn cache at {}", cache.dir().display());
        builder = builder.cache(Arc::new(cache));
    }

    Ok(builder.build())
}
