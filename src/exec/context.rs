/// Per-attempt execution context
///
/// Handed to the cache and the runner for exactly one attempt at one spawn.
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tracing::debug;

use super::arbitration::{ArbitrationSlot, CoordinatorId};
use super::environment::{ExecutionEnvironment, OutErr};
use super::error::LostRace;
use crate::events::{ActionStatusMessage, ExecEvent, ProgressStatus};
use crate::inputs::{ArtifactExpander, InputMapping, InputMetadataProvider, SpawnInputExpander};
use crate::spawn::{ActionInput, Spawn};

/// Shared by every coordinator in the process
static ATTEMPT_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct AttemptContext<'a> {
    id: u64,
    spawn: &'a Spawn,
    env: &'a ExecutionEnvironment,
    expander: &'a dyn SpawnInputExpander,
    coordinator: CoordinatorId,
    slot: Option<Arc<ArbitrationSlot>>,
    timeout: Duration,
    input_mapping: OnceLock<InputMapping>,
    mapping_init: Mutex<()>,
}

impl<'a> AttemptContext<'a> {
    pub fn new(
        spawn: &'a Spawn,
        env: &'a ExecutionEnvironment,
        expander: &'a dyn SpawnInputExpander,
        coordinator: CoordinatorId,
        slot: Option<Arc<ArbitrationSlot>>,
        timeout: Duration,
    ) -> Self {
        Self {
            id: ATTEMPT_COUNTER.fetch_add(1, Ordering::Relaxed) + 1,
            spawn,
            env,
            expander,
            coordinator,
            slot,
            timeout,
            input_mapping: OnceLock::new(),
            mapping_init: Mutex::new(()),
        }
    }

    /// Process-wide unique, strictly increasing attempt id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn spawn(&self) -> &Spawn {
        self.spawn
    }

    pub fn coordinator(&self) -> CoordinatorId {
        self.coordinator
    }

    pub fn exec_root(&self) -> &Path {
        self.env.exec_root()
    }

    pub fn out_err(&self) -> &OutErr {
        self.env.out_err()
    }

    pub fn input_metadata(&self) -> &dyn InputMetadataProvider {
        self.env.input_metadata()
    }

    pub fn artifact_expander(&self) -> &dyn ArtifactExpander {
        self.env.artifact_expander()
    }

    /// Fixed at construction; enforcing it is the runner's job
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether this attempt races other attempts for the same spawn
    pub fn speculating(&self) -> bool {
        self.slot.is_some()
    }

    /// Input mapping of the spawn, computed on first use and reused after
    pub fn input_mapping(&self) -> io::Result<&InputMapping> {
        if let Some(mapping) = self.input_mapping.get() {
            return Ok(mapping);
        }

        let _guard = self
            .mapping_init
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(mapping) = self.input_mapping.get() {
            return Ok(mapping);
        }

        let mapping = self.expander.input_mapping(
            self.spawn,
            self.env.artifact_expander(),
            self.env.input_metadata(),
            self.env.fileset_resolver(),
        )?;
        debug!(
            attempt = self.id,
            entry_count = mapping.len(),
            "input mapping computed"
        );
        Ok(self.input_mapping.get_or_init(|| mapping))
    }

    /// Materialize every mapped input, unless the spawn opted out
    pub fn prefetch_inputs(&self) -> io::Result<()> {
        if !self.spawn.should_prefetch_inputs_for_local_execution() {
            return Ok(());
        }
        let inputs: Vec<&ActionInput> = self.input_mapping()?.values().collect();
        self.env.prefetcher().prefetch_files(&inputs)
    }

    /// Claim the right to write outputs
    ///
    /// Must be called before a runner or cache writes any declared output.
    /// Without an arbitration slot this always succeeds.
    pub fn lock_output_files(&self) -> Result<(), LostRace> {
        match &self.slot {
            None => Ok(()),
            Some(slot) if slot.try_claim(self.coordinator) => Ok(()),
            Some(_) => {
                debug!(
                    attempt = self.id,
                    coordinator = %self.coordinator,
                    "lost output arbitration"
                );
                Err(LostRace { attempt: self.id })
            }
        }
    }

    /// Post a progress notification for the spawn's owner
    pub fn report(&self, state: ProgressStatus, name: &str) {
        let owner = self.spawn.resource_owner();
        match state {
            ProgressStatus::Executing => self
                .env
                .events()
                .post(ExecEvent::Status(ActionStatusMessage::running(owner, name))),
            ProgressStatus::Scheduling => self
                .env
                .events()
                .post(ExecEvent::Status(ActionStatusMessage::scheduling(owner))),
            ProgressStatus::CheckingCache | ProgressStatus::Downloading => {}
        }
    }
}
