//! Input mapping for spawns
//!
//! Turns the declared inputs of a [`Spawn`] into a flat, path-ordered mapping
//! from exec-root relative path to the concrete input backing it:
//!
//! - **File** inputs map to themselves (a file input that turns out to be a
//!   directory is expanded like a tree)
//! - **Tree** inputs are expanded into their files by an [`ArtifactExpander`]
//! - **Fileset** inputs are resolved by a [`FilesetResolver`]
//!
//! The mapping is a `BTreeMap`, so iteration order is deterministic for cache
//! keys and prefetching alike.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use crate::spawn::{ActionInput, InputKind, Spawn};

mod expander;
mod metadata;
mod prefetch;

pub use expander::{DirectoryArtifactExpander, GlobFilesetResolver};
pub use metadata::{DigestingMetadataCache, FileMetadata};
pub use prefetch::{NoopPrefetcher, WarmingPrefetcher};

/// Path-ordered mapping from exec-root relative path to input
pub type InputMapping = BTreeMap<PathBuf, ActionInput>;

/// Expands tree artifacts (directories) into the files they contain
pub trait ArtifactExpander: Send + Sync {
    fn expand(&self, tree: &ActionInput) -> io::Result<Vec<ActionInput>>;
}

/// Resolves fileset inputs into (mapped path, source file) pairs
pub trait FilesetResolver: Send + Sync {
    fn resolve(&self, fileset: &ActionInput, pattern: &str)
        -> io::Result<Vec<(PathBuf, ActionInput)>>;
}

/// File identity cache: size, digest and kind of an input
pub trait InputMetadataProvider: Send + Sync {
    fn metadata(&self, input: &ActionInput) -> io::Result<FileMetadata>;
}

/// Materializes inputs locally before execution
pub trait InputPrefetcher: Send + Sync {
    fn prefetch_files(&self, inputs: &[&ActionInput]) -> io::Result<()>;
}

/// Computes the input mapping of a spawn
pub trait SpawnInputExpander: Send + Sync {
    fn input_mapping(
        &self,
        spawn: &Spawn,
        artifacts: &dyn ArtifactExpander,
        metadata: &dyn InputMetadataProvider,
        filesets: Option<&dyn FilesetResolver>,
    ) -> io::Result<InputMapping>;
}

/// Standard expander used by the coordinator
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultInputExpander;

impl DefaultInputExpander {
    pub fn new() -> Self {
        Self
    }
}

impl SpawnInputExpander for DefaultInputExpander {
    fn input_mapping(
        &self,
        spawn: &Spawn,
        artifacts: &dyn ArtifactExpander,
        metadata: &dyn InputMetadataProvider,
        filesets: Option<&dyn FilesetResolver>,
    ) -> io::Result<InputMapping> {
        let mut mapping = InputMapping::new();

        for input in spawn.inputs() {
            match &input.kind {
                InputKind::File => {
                    if metadata.metadata(input)?.is_directory {
                        for file in artifacts.expand(input)? {
                            add_mapping(&mut mapping, file.exec_path.clone(), file)?;
                        }
                    } else {
                        add_mapping(&mut mapping, input.exec_path.clone(), input.clone())?;
                    }
                }
                InputKind::Tree => {
                    for file in artifacts.expand(input)? {
                        metadata.metadata(&file)?;
                        add_mapping(&mut mapping, file.exec_path.clone(), file)?;
                    }
                }
                InputKind::Fileset { pattern } => {
                    let resolver = filesets.ok_or_else(|| {
                        io::Error::new(
                            io::ErrorKind::InvalidInput,
                            format!(
                                "No fileset resolver available for {}",
                                input.exec_path.display()
                            ),
                        )
                    })?;
                    for (path, file) in resolver.resolve(input, pattern)? {
                        metadata.metadata(&file)?;
                        add_mapping(&mut mapping, path, file)?;
                    }
                }
            }
        }

        Ok(mapping)
    }
}

/// Insert a mapping entry; two different inputs may not claim the same path
fn add_mapping(mapping: &mut InputMapping, path: PathBuf, input: ActionInput) -> io::Result<()> {
    if let Some(existing) = mapping.get(&path) {
        if existing.exec_path != input.exec_path {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Conflicting inputs for {}: {} and {}",
                    path.display(),
                    existing.exec_path.display(),
                    input.exec_path.display()
                ),
            ));
        }
        return Ok(());
    }
    mapping.insert(path, input);
    Ok(())
}
