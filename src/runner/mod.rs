//! Execution backends
//!
//! A [`SpawnRunner`] executes one spawn for one attempt. Runners must:
//!
//! - call [`AttemptContext::lock_output_files`] before writing any declared output
//! - enforce [`AttemptContext::timeout`] (zero means no limit)
//! - report progress through [`AttemptContext::report`]

use crate::exec::{AttemptContext, ExecError};
use crate::spawn::{Spawn, SpawnResult};

mod local;

pub use local::LocalSpawnRunner;

pub trait SpawnRunner: Send + Sync {
    /// Strategy label used in progress events and logs
    fn name(&self) -> &str;

    fn exec(&self, spawn: &Spawn, context: &AttemptContext<'_>) -> Result<SpawnResult, ExecError>;
}
