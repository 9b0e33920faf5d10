/// Spawn coordinator: cache lookup, execution, cache store and result validation
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::arbitration::{ArbitrationSlot, CoordinatorId};
use super::context::AttemptContext;
use super::environment::ExecutionEnvironment;
use super::error::ExecError;
use crate::cache::{NoSpawnCache, SpawnCache};
use crate::events::ExecEvent;
use crate::inputs::{DefaultInputExpander, SpawnInputExpander};
use crate::logging::{operations, services, status};
use crate::runner::SpawnRunner;
use crate::spawn::{describe_command_failure, Spawn, SpawnResult};

/// Long-lived orchestrator for one execution strategy
pub struct SpawnCoordinator {
    id: CoordinatorId,
    runner: Arc<dyn SpawnRunner>,
    expander: Arc<dyn SpawnInputExpander>,
    default_timeout: Duration,
}

impl SpawnCoordinator {
    pub fn new(runner: Arc<dyn SpawnRunner>) -> Self {
        Self {
            id: CoordinatorId::next(),
            runner,
            expander: Arc::new(DefaultInputExpander::new()),
            default_timeout: Duration::ZERO,
        }
    }

    pub fn with_input_expander(mut self, expander: Arc<dyn SpawnInputExpander>) -> Self {
        self.expander = expander;
        self
    }

    /// Timeout used for spawns that do not declare one
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Identity used as this coordinator's arbitration token
    pub fn id(&self) -> CoordinatorId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.runner.name()
    }

    /// Execute a spawn outside of any speculative race
    pub fn exec(
        &self,
        spawn: &Spawn,
        env: &ExecutionEnvironment,
    ) -> Result<Vec<SpawnResult>, ExecError> {
        self.exec_speculative(spawn, env, None)
    }

    /// Execute a spawn, optionally racing other coordinators sharing `slot`
    ///
    /// Returns exactly one result on success. Non-success statuses, lost races
    /// and infrastructure failures are errors.
    pub fn exec_speculative(
        &self,
        spawn: &Spawn,
        env: &ExecutionEnvironment,
        slot: Option<Arc<ArbitrationSlot>>,
    ) -> Result<Vec<SpawnResult>, ExecError> {
        if env.reports_subcommands() {
            env.events().post(ExecEvent::Subcommand {
                owner: spawn.resource_owner().clone(),
                command_line: spawn.command_line(),
            });
        }

        let declared = spawn.timeout().map_err(ExecError::InvalidSpawn)?;
        let timeout = if declared.is_zero() {
            self.default_timeout
        } else {
            declared
        };

        let context = AttemptContext::new(
            spawn,
            env,
            self.expander.as_ref(),
            self.id,
            slot,
            timeout,
        );

        debug!(
            service = services::COORDINATOR,
            attempt = context.id(),
            runner = self.name(),
            speculating = context.speculating(),
            "==> exec {}",
            spawn.resource_owner().label
        );

        let cache: &dyn SpawnCache = env.cache().unwrap_or(&NoSpawnCache);
        let result = self.lookup_or_run(spawn, &context, cache, env.exec_root())?;

        if !result.status().is_success() {
            info!(
                service = services::COORDINATOR,
                operation = operations::EXEC,
                status = status::ERROR,
                attempt = context.id(),
                spawn_status = %result.status(),
                "<== {} failed",
                spawn.resource_owner().label
            );
            let message = if result.failure_message().is_empty() {
                describe_command_failure(
                    env.verbose_failures(),
                    spawn.arguments(),
                    spawn.environment(),
                    &env.exec_root().to_string_lossy(),
                )
            } else {
                result.failure_message().to_string()
            };
            return Err(ExecError::SpawnFailed {
                message,
                result: Box::new(result),
            });
        }

        debug!(
            service = services::COORDINATOR,
            operation = operations::EXEC,
            status = status::SUCCESS,
            attempt = context.id(),
            cache_hit = result.is_cache_hit(),
            "<== {} succeeded",
            spawn.resource_owner().label
        );

        Ok(vec![result])
    }

    /// Serve from cache or run; the cache handle is released when this returns
    fn lookup_or_run(
        &self,
        spawn: &Spawn,
        context: &AttemptContext<'_>,
        cache: &dyn SpawnCache,
        exec_root: &Path,
    ) -> Result<SpawnResult, ExecError> {
        let mut handle = cache.lookup(spawn, context)?;

        if handle.has_result() {
            return match handle.result() {
                Some(result) => Ok(result),
                None => panic!(
                    "cache handle for {} reported a result but returned none",
                    spawn.resource_owner().label
                ),
            };
        }

        let result = self.runner.exec(spawn, context)?;

        if handle.will_store() {
            let outputs = spawn.existing_outputs(exec_root);
            handle
                .store(&result, &outputs)
                .map_err(ExecError::environmental)?;
        }

        Ok(result)
    }
}
