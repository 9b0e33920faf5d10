use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing::debug;

use super::InputPrefetcher;
use crate::logging::{operations, services};
use crate::spawn::ActionInput;

/// Prefetcher for inputs that are already local
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPrefetcher;

impl InputPrefetcher for NoopPrefetcher {
    fn prefetch_files(&self, _inputs: &[&ActionInput]) -> io::Result<()> {
        Ok(())
    }
}

/// Reads every input once so missing or unreadable files fail before the spawn starts
pub struct WarmingPrefetcher {
    exec_root: PathBuf,
}

impl WarmingPrefetcher {
    pub fn new(exec_root: impl Into<PathBuf>) -> Self {
        Self {
            exec_root: exec_root.into(),
        }
    }
}

impl InputPrefetcher for WarmingPrefetcher {
    fn prefetch_files(&self, inputs: &[&ActionInput]) -> io::Result<()> {
        let mut bytes = 0u64;
        for input in inputs {
            let mut file = File::open(self.exec_root.join(&input.exec_path))?;
            bytes += io::copy(&mut file, &mut io::sink())?;
        }
        debug!(
            service = services::LOCAL_RUNNER,
            operation = operations::PREFETCH,
            entry_count = inputs.len(),
            size_bytes = bytes,
            "inputs prefetched"
        );
        Ok(())
    }
}
