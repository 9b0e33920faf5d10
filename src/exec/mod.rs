//! Spawn execution coordination
//!
//! ## Architecture
//!
//! A [`SpawnCoordinator`] is built once per execution strategy and wraps one
//! [`SpawnRunner`](crate::runner::SpawnRunner). For every spawn it:
//!
//! 1. Creates a fresh [`AttemptContext`] (unique id, timeout, optional
//!    [`ArbitrationSlot`])
//! 2. Asks the environment's [`SpawnCache`](crate::cache::SpawnCache) for a
//!    handle; a hit is returned as-is
//! 3. On a miss runs the spawn and stores the result if the handle wants it
//! 4. Turns any non-success status into [`ExecError::SpawnFailed`]
//!
//! ## Speculative execution
//!
//! Several coordinators may race on the same logical spawn by sharing one
//! [`ArbitrationSlot`]. Whoever calls
//! [`AttemptContext::lock_output_files`] first wins; everyone else gets
//! [`ExecError::Cancelled`] and must not touch the outputs.

mod arbitration;
mod context;
mod coordinator;
mod environment;
mod error;

pub use arbitration::{ArbitrationSlot, CoordinatorId};
pub use context::AttemptContext;
pub use coordinator::SpawnCoordinator;
pub use environment::{ExecutionEnvironment, ExecutionEnvironmentBuilder, OutErr, OutputSink};
pub use error::{ExecError, LostRace};
