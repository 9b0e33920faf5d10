use std::io;
use thiserror::Error;

use crate::spawn::SpawnResult;

/// An attempt tried to lock outputs already claimed by another coordinator
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("attempt {attempt} lost the race to write outputs")]
pub struct LostRace {
    pub attempt: u64,
}

/// Failure of one `SpawnCoordinator::exec` call
#[derive(Error, Debug)]
pub enum ExecError {
    /// Infrastructure failure (cache, filesystem) unrelated to the action itself.
    /// Retrying on a different backend may succeed.
    #[error("{message}: {source}")]
    Environmental {
        message: String,
        #[source]
        source: io::Error,
    },

    /// The spawn ran (or was served from cache) with a non-success status
    #[error("{message}")]
    SpawnFailed {
        message: String,
        result: Box<SpawnResult>,
    },

    /// The attempt lost output arbitration to a concurrent attempt
    #[error("execution cancelled: {0}")]
    Cancelled(#[from] LostRace),

    #[error("Invalid spawn: {0}")]
    InvalidSpawn(String),
}

impl ExecError {
    pub fn environmental(source: io::Error) -> Self {
        ExecError::Environmental {
            message: "Unexpected IO error".to_string(),
            source,
        }
    }

    pub fn is_environmental(&self) -> bool {
        matches!(self, ExecError::Environmental { .. })
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, ExecError::Cancelled(_))
    }

    /// Result attached to a failed spawn, if any
    pub fn spawn_result(&self) -> Option<&SpawnResult> {
        match self {
            ExecError::SpawnFailed { result, .. } => Some(result),
            _ => None,
        }
    }
}

impl From<io::Error> for ExecError {
    fn from(err: io::Error) -> Self {
        ExecError::environmental(err)
    }
}
