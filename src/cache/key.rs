/// Cache key generation for spawns
///
/// Generates content-addressed cache keys based on:
/// - Argument vector
/// - Environment variables
/// - Input mapping (paths and content digests)
/// - Declared outputs
/// - Host OS
use sha2::{Digest, Sha256};
use std::io;

use crate::exec::AttemptContext;
use crate::spawn::Spawn;

/// Compute the cache key of a spawn
///
/// Format: "spawn-{hex_hash}" where hex_hash is the first 32 characters of SHA256.
/// Reads the attempt's (memoized) input mapping.
pub fn compute_cache_key(spawn: &Spawn, context: &AttemptContext<'_>) -> io::Result<String> {
    let mut hasher = Sha256::new();

    // Length prefixes keep ["ab", "c"] and ["a", "bc"] apart
    let mut field = |bytes: &[u8]| {
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    };

    // 1. Arguments
    field(b"args");
    for arg in spawn.arguments() {
        field(arg.as_bytes());
    }

    // 2. Environment (BTreeMap, already sorted)
    field(b"env");
    for (key, value) in spawn.environment() {
        field(key.as_bytes());
        field(value.as_bytes());
    }

    // 3. Inputs, in mapping order
    field(b"inputs");
    let metadata = context.input_metadata();
    for (path, input) in context.input_mapping()? {
        field(path.to_string_lossy().as_bytes());
        field(metadata.metadata(input)?.digest.as_bytes());
    }

    // 4. Outputs
    field(b"outputs");
    for output in spawn.outputs() {
        field(output.exec_path_string().as_bytes());
    }

    // 5. OS, for cross-platform caches
    field(std::env::consts::OS.as_bytes());

    let hash = hex::encode(hasher.finalize());
    Ok(format!("spawn-{}", &hash[..32]))
}
