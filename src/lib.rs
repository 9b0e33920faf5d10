// Library interface for fabrik-spawn
// This allows integration tests and external code to drive spawns directly

pub mod cache;
pub mod config;
pub mod config_discovery;
pub mod events;
pub mod exec;
pub mod inputs;
pub mod logging;
pub mod runner;
pub mod spawn;
pub mod xdg;

// Re-export commonly used types
pub use cache::{CacheHandle, CachePolicy, DiskSpawnCache, NoSpawnCache, SpawnCache};
pub use config::SpawnConfig;
pub use exec::{
    ArbitrationSlot, AttemptContext, ExecError, ExecutionEnvironment, OutErr, SpawnCoordinator,
};
pub use runner::{LocalSpawnRunner, SpawnRunner};
pub use spawn::{ActionInput, ResourceOwner, Spawn, SpawnResult, SpawnStatus};
