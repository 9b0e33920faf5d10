/// Local process runner
///
/// Handles spawning the process, redirecting output, monitoring the timeout,
/// and mapping the exit status.
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::SpawnRunner;
use crate::events::ProgressStatus;
use crate::exec::{AttemptContext, ExecError, OutputSink};
use crate::logging::services;
use crate::spawn::{Spawn, SpawnResult, SpawnStatus};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs spawns as child processes in the exec root
pub struct LocalSpawnRunner {
    name: String,
}

impl LocalSpawnRunner {
    pub fn new() -> Self {
        Self::with_name("local")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn stdio(sink: &OutputSink) -> io::Result<Stdio> {
        Ok(match sink {
            OutputSink::Inherit => Stdio::inherit(),
            OutputSink::Discard => Stdio::null(),
            OutputSink::File(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                Stdio::from(File::create(path)?)
            }
        })
    }

    /// Resolve the executable from PATH, falling back to the name as-is
    fn resolve_executable(&self, executable: &str) -> PathBuf {
        if executable.contains(std::path::MAIN_SEPARATOR) {
            return PathBuf::from(executable);
        }
        which::which(executable).unwrap_or_else(|e| {
            debug!(
                "[fabrik] Could not find '{}' in PATH: {}. Trying as-is.",
                executable, e
            );
            PathBuf::from(executable)
        })
    }

    /// Wait for the child, killing it once `timeout` elapses
    fn wait_with_timeout(child: &mut Child, timeout: Duration) -> io::Result<(ExitStatus, bool)> {
        let start = Instant::now();

        loop {
            if let Some(status) = child.try_wait()? {
                return Ok((status, false));
            }
            if start.elapsed() >= timeout {
                child.kill()?;
                // Reap zombie
                let status = child.wait()?;
                return Ok((status, true));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Default for LocalSpawnRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl SpawnRunner for LocalSpawnRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn exec(&self, spawn: &Spawn, context: &AttemptContext<'_>) -> Result<SpawnResult, ExecError> {
        context.report(ProgressStatus::Scheduling, &self.name);

        let (executable, args) = spawn
            .arguments()
            .split_first()
            .ok_or_else(|| ExecError::InvalidSpawn("empty argument vector".to_string()))?;

        context.prefetch_inputs()?;
        context.report(ProgressStatus::Executing, &self.name);

        // Nothing below may run for an attempt that lost the race
        context.lock_output_files()?;

        let exec_root = context.exec_root();
        for output in spawn.outputs() {
            if let Some(parent) = exec_root.join(&output.exec_path).parent() {
                fs::create_dir_all(parent)?;
            }
        }

        let program = self.resolve_executable(executable);
        let mut cmd = Command::new(&program);
        cmd.args(args)
            .env_clear()
            .envs(spawn.environment())
            .current_dir(exec_root)
            .stdin(Stdio::null())
            .stdout(Self::stdio(&context.out_err().stdout)?)
            .stderr(Self::stdio(&context.out_err().stderr)?);

        debug!(
            service = services::LOCAL_RUNNER,
            attempt = context.id(),
            "Command: {:?}",
            cmd
        );

        let start = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(
                    service = services::LOCAL_RUNNER,
                    attempt = context.id(),
                    "Failed to start {}: {}",
                    program.display(),
                    e
                );
                return Ok(SpawnResult::new(SpawnStatus::ExecutionFailed, &self.name)
                    .with_failure_message(format!(
                        "{}: failed to start {}: {}",
                        spawn.resource_owner().label,
                        program.display(),
                        e
                    ))
                    .with_wall_time(start.elapsed()));
            }
        };

        let timeout = context.timeout();
        let (status, timed_out) = if timeout.is_zero() {
            (child.wait()?, false)
        } else {
            Self::wait_with_timeout(&mut child, timeout)?
        };
        let wall_time = start.elapsed();

        let exit_code = status.code().unwrap_or(-1);
        let spawn_status = if timed_out {
            SpawnStatus::Timeout
        } else if status.success() {
            SpawnStatus::Success
        } else {
            SpawnStatus::NonZeroExit
        };

        debug!(
            service = services::LOCAL_RUNNER,
            attempt = context.id(),
            exit_code = exit_code,
            spawn_status = %spawn_status,
            "Completed in {:.2}s",
            wall_time.as_secs_f64()
        );

        Ok(SpawnResult::new(spawn_status, &self.name)
            .with_exit_code(exit_code)
            .with_wall_time(wall_time))
    }
}
