/// Spawn and SpawnResult data types
///
/// A spawn is the immutable description of one executable invocation. The
/// coordinator never mutates it; backends and caches only read from it.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod describe;

pub use describe::{describe_command, describe_command_failure, CommandDescriptionForm};

/// Execution info key carrying the timeout in whole seconds
pub const TIMEOUT_KEY: &str = "timeout";

/// Execution info key that opts a spawn out of local input prefetching
pub const DISABLE_LOCAL_PREFETCH_KEY: &str = "disable-local-prefetch";

/// How an input path should be turned into concrete files
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum InputKind {
    /// A single regular file
    File,
    /// A directory whose files are all inputs (expanded by an `ArtifactExpander`)
    Tree,
    /// A glob pattern relative to the exec root (resolved by a `FilesetResolver`)
    Fileset { pattern: String },
}

/// An input or output of a spawn, addressed relative to the exec root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionInput {
    pub exec_path: PathBuf,
    #[serde(flatten)]
    pub kind: InputKind,
}

impl ActionInput {
    pub fn file(exec_path: impl Into<PathBuf>) -> Self {
        Self {
            exec_path: exec_path.into(),
            kind: InputKind::File,
        }
    }

    pub fn tree(exec_path: impl Into<PathBuf>) -> Self {
        Self {
            exec_path: exec_path.into(),
            kind: InputKind::Tree,
        }
    }

    /// A fileset mounted at `exec_path`, containing the files matching `pattern`
    pub fn fileset(exec_path: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            exec_path: exec_path.into(),
            kind: InputKind::Fileset {
                pattern: pattern.into(),
            },
        }
    }

    pub fn exec_path_string(&self) -> String {
        self.exec_path.to_string_lossy().to_string()
    }
}

/// The logical action a spawn belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOwner {
    /// Target label (e.g. "//app:bin")
    pub label: String,
    /// Short action kind (e.g. "CppCompile")
    pub mnemonic: String,
}

impl ResourceOwner {
    pub fn new(label: impl Into<String>, mnemonic: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            mnemonic: mnemonic.into(),
        }
    }
}

/// Immutable description of one executable invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spawn {
    arguments: Vec<String>,
    environment: BTreeMap<String, String>,
    inputs: Vec<ActionInput>,
    outputs: Vec<ActionInput>,
    owner: ResourceOwner,
    execution_info: BTreeMap<String, String>,
}

impl Spawn {
    pub fn builder(owner: ResourceOwner) -> SpawnBuilder {
        SpawnBuilder::new(owner)
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn inputs(&self) -> &[ActionInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ActionInput] {
        &self.outputs
    }

    pub fn resource_owner(&self) -> &ResourceOwner {
        &self.owner
    }

    pub fn execution_info(&self) -> &BTreeMap<String, String> {
        &self.execution_info
    }

    /// The executable (first argument), or "" for an empty argument vector
    pub fn executable(&self) -> &str {
        self.arguments.first().map(String::as_str).unwrap_or("")
    }

    /// Shell-like single line rendering of the argument vector
    pub fn command_line(&self) -> String {
        self.arguments.join(" ")
    }

    /// Timeout declared in the execution info
    ///
    /// Absent means `Duration::ZERO` (no limit). A value that is not a whole
    /// number of seconds is rejected.
    pub fn timeout(&self) -> Result<Duration, String> {
        match self.execution_info.get(TIMEOUT_KEY) {
            None => Ok(Duration::ZERO),
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| format!("{} has invalid timeout '{}'", self.owner.label, value)),
        }
    }

    pub fn should_prefetch_inputs_for_local_execution(&self) -> bool {
        !self.execution_info.contains_key(DISABLE_LOCAL_PREFETCH_KEY)
    }

    /// Absolute paths of declared outputs that exist under `exec_root`
    pub fn existing_outputs(&self, exec_root: &Path) -> Vec<PathBuf> {
        self.outputs
            .iter()
            .map(|output| exec_root.join(&output.exec_path))
            .filter(|path| path.exists())
            .collect()
    }
}

/// Builder for [`Spawn`]
#[derive(Debug, Clone)]
pub struct SpawnBuilder {
    spawn: Spawn,
}

impl SpawnBuilder {
    pub fn new(owner: ResourceOwner) -> Self {
        Self {
            spawn: Spawn {
                arguments: Vec::new(),
                environment: BTreeMap::new(),
                inputs: Vec::new(),
                outputs: Vec::new(),
                owner,
                execution_info: BTreeMap::new(),
            },
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spawn.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spawn.environment.insert(key.into(), value.into());
        self
    }

    pub fn input(mut self, input: ActionInput) -> Self {
        self.spawn.inputs.push(input);
        self
    }

    pub fn output(mut self, output: impl Into<PathBuf>) -> Self {
        self.spawn.outputs.push(ActionInput::file(output));
        self
    }

    pub fn execution_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spawn.execution_info.insert(key.into(), value.into());
        self
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        self.execution_info(TIMEOUT_KEY, timeout.as_secs().to_string())
    }

    pub fn build(self) -> Spawn {
        self.spawn
    }
}

/// Outcome status of one execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnStatus {
    Success,
    NonZeroExit,
    Timeout,
    OutOfMemory,
    /// The process could not be started
    ExecutionFailed,
    ExecutionDenied,
    Interrupted,
}

impl SpawnStatus {
    pub fn is_success(self) -> bool {
        self == SpawnStatus::Success
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SpawnStatus::Success => "success",
            SpawnStatus::NonZeroExit => "non_zero_exit",
            SpawnStatus::Timeout => "timeout",
            SpawnStatus::OutOfMemory => "out_of_memory",
            SpawnStatus::ExecutionFailed => "execution_failed",
            SpawnStatus::ExecutionDenied => "execution_denied",
            SpawnStatus::Interrupted => "interrupted",
        }
    }
}

impl std::fmt::Display for SpawnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one execution attempt, from a backend or a cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnResult {
    status: SpawnStatus,
    exit_code: Option<i32>,
    #[serde(default)]
    failure_message: String,
    runner_name: String,
    #[serde(default, with = "wall_time_millis")]
    wall_time: Option<Duration>,
    #[serde(default)]
    cache_hit: bool,
}

impl SpawnResult {
    pub fn new(status: SpawnStatus, runner_name: impl Into<String>) -> Self {
        Self {
            status,
            exit_code: None,
            failure_message: String::new(),
            runner_name: runner_name.into(),
            wall_time: None,
            cache_hit: false,
        }
    }

    pub fn success(runner_name: impl Into<String>) -> Self {
        Self::new(SpawnStatus::Success, runner_name).with_exit_code(0)
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }

    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = message.into();
        self
    }

    pub fn with_wall_time(mut self, wall_time: Duration) -> Self {
        self.wall_time = Some(wall_time);
        self
    }

    /// Same result, marked as served from a cache
    pub fn into_cache_hit(mut self) -> Self {
        self.cache_hit = true;
        self
    }

    pub fn status(&self) -> SpawnStatus {
        self.status
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Backend provided failure message; empty when none was given
    pub fn failure_message(&self) -> &str {
        &self.failure_message
    }

    pub fn runner_name(&self) -> &str {
        &self.runner_name
    }

    pub fn wall_time(&self) -> Option<Duration> {
        self.wall_time
    }

    pub fn is_cache_hit(&self) -> bool {
        self.cache_hit
    }
}

mod wall_time_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
