/// Ambient execution environment handed to the coordinator
///
/// Every capability is an explicit field; there is no lookup by type.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::SpawnCache;
use crate::events::{EventSink, NullEventSink};
use crate::inputs::{
    ArtifactExpander, DigestingMetadataCache, DirectoryArtifactExpander, FilesetResolver,
    GlobFilesetResolver, InputMetadataProvider, InputPrefetcher, NoopPrefetcher,
};

/// Destination of one output stream of a spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    /// Pass through to this process's stream
    Inherit,
    Discard,
    /// Write (truncating) to a file
    File(PathBuf),
}

/// Where a spawn's stdout and stderr go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutErr {
    pub stdout: OutputSink,
    pub stderr: OutputSink,
}

impl OutErr {
    pub fn inherit() -> Self {
        Self {
            stdout: OutputSink::Inherit,
            stderr: OutputSink::Inherit,
        }
    }

    pub fn discard() -> Self {
        Self {
            stdout: OutputSink::Discard,
            stderr: OutputSink::Discard,
        }
    }

    pub fn files(stdout: impl Into<PathBuf>, stderr: impl Into<PathBuf>) -> Self {
        Self {
            stdout: OutputSink::File(stdout.into()),
            stderr: OutputSink::File(stderr.into()),
        }
    }
}

impl Default for OutErr {
    fn default() -> Self {
        Self::discard()
    }
}

pub struct ExecutionEnvironment {
    exec_root: PathBuf,
    events: Arc<dyn EventSink>,
    cache: Option<Arc<dyn SpawnCache>>,
    verbose_failures: bool,
    report_subcommands: bool,
    out_err: OutErr,
    input_metadata: Arc<dyn InputMetadataProvider>,
    artifact_expander: Arc<dyn ArtifactExpander>,
    prefetcher: Arc<dyn InputPrefetcher>,
    fileset_resolver: Option<Arc<dyn FilesetResolver>>,
}

impl ExecutionEnvironment {
    /// Builder with filesystem defaults rooted at `exec_root`
    pub fn builder(exec_root: impl Into<PathBuf>) -> ExecutionEnvironmentBuilder {
        ExecutionEnvironmentBuilder::new(exec_root.into())
    }

    pub fn exec_root(&self) -> &Path {
        &self.exec_root
    }

    pub fn events(&self) -> &dyn EventSink {
        self.events.as_ref()
    }

    /// Configured spawn cache; `None` means caching is off
    pub fn cache(&self) -> Option<&dyn SpawnCache> {
        self.cache.as_deref()
    }

    pub fn verbose_failures(&self) -> bool {
        self.verbose_failures
    }

    pub fn reports_subcommands(&self) -> bool {
        self.report_subcommands
    }

    pub fn out_err(&self) -> &OutErr {
        &self.out_err
    }

    pub fn input_metadata(&self) -> &dyn InputMetadataProvider {
        self.input_metadata.as_ref()
    }

    pub fn artifact_expander(&self) -> &dyn ArtifactExpander {
        self.artifact_expander.as_ref()
    }

    pub fn prefetcher(&self) -> &dyn InputPrefetcher {
        self.prefetcher.as_ref()
    }

    pub fn fileset_resolver(&self) -> Option<&dyn FilesetResolver> {
        self.fileset_resolver.as_deref()
    }
}

pub struct ExecutionEnvironmentBuilder {
    env: ExecutionEnvironment,
}

impl ExecutionEnvironmentBuilder {
    fn new(exec_root: PathBuf) -> Self {
        Self {
            env: ExecutionEnvironment {
                events: Arc::new(NullEventSink),
                cache: None,
                verbose_failures: false,
                report_subcommands: false,
                out_err: OutErr::default(),
                input_metadata: Arc::new(DigestingMetadataCache::new(&exec_root)),
                artifact_expander: Arc::new(DirectoryArtifactExpander::new(&exec_root)),
                prefetcher: Arc::new(NoopPrefetcher),
                fileset_resolver: Some(Arc::new(GlobFilesetResolver::new(&exec_root))),
                exec_root,
            },
        }
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.env.events = events;
        self
    }

    pub fn cache(mut self, cache: Arc<dyn SpawnCache>) -> Self {
        self.env.cache = Some(cache);
        self
    }

    pub fn verbose_failures(mut self, verbose: bool) -> Self {
        self.env.verbose_failures = verbose;
        self
    }

    pub fn report_subcommands(mut self, report: bool) -> Self {
        self.env.report_subcommands = report;
        self
    }

    pub fn out_err(mut self, out_err: OutErr) -> Self {
        self.env.out_err = out_err;
        self
    }

    pub fn input_metadata(mut self, metadata: Arc<dyn InputMetadataProvider>) -> Self {
        self.env.input_metadata = metadata;
        self
    }

    pub fn artifact_expander(mut self, expander: Arc<dyn ArtifactExpander>) -> Self {
        self.env.artifact_expander = expander;
        self
    }

    pub fn prefetcher(mut self, prefetcher: Arc<dyn InputPrefetcher>) -> Self {
        self.env.prefetcher = prefetcher;
        self
    }

    /// Replace (or with `None`, remove) the fileset resolver
    pub fn fileset_resolver(mut self, resolver: Option<Arc<dyn FilesetResolver>>) -> Self {
        self.env.fileset_resolver = resolver;
        self
    }

    pub fn build(self) -> ExecutionEnvironment {
        self.env
    }
}
