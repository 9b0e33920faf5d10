use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// fabrik-spawn - run build actions with result caching
///
/// Executes a command as a spawn: declared inputs are hashed into a cache key,
/// a cached result is restored when one exists, and fresh results are stored
/// for the next run.
#[derive(Parser, Debug)]
#[command(name = "fabrik-spawn")]
#[command(author = "Tuist Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run build actions through a spawn cache", long_about = None)]
pub struct Cli {
    /// Config file path (default: discover fabrik-spawn.toml)
    #[arg(short = 'c', long, global = true, env = "FABRIK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, global = true, env = "FABRIK_CONFIG_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute one command as a cached spawn
    Exec(ExecArgs),

    /// Manage the spawn cache
    Cache(CacheArgs),

    /// Configuration management utilities
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct ExecArgs {
    /// Directory the command runs in; inputs and outputs are relative to it
    #[arg(long, env = "FABRIK_EXEC_ROOT")]
    pub exec_root: Option<PathBuf>,

    /// Spawn cache directory
    #[arg(long, env = "FABRIK_CONFIG_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Skip the cache entirely
    #[arg(long)]
    pub no_cache: bool,

    /// Serve cache hits but never store results
    #[arg(long)]
    pub read_only: bool,

    /// Also cache results of failed commands
    #[arg(long)]
    pub cache_failures: bool,

    /// Input file (repeatable)
    #[arg(short = 'i', long = "input")]
    pub inputs: Vec<PathBuf>,

    /// Input directory, expanded to every file below it (repeatable)
    #[arg(long = "tree")]
    pub trees: Vec<PathBuf>,

    /// Input fileset as PATH=GLOB (repeatable)
    #[arg(long = "fileset", value_parser = parse_key_val)]
    pub filesets: Vec<(String, String)>,

    /// Declared output file (repeatable)
    #[arg(short = 'o', long = "output")]
    pub outputs: Vec<PathBuf>,

    /// Environment variable as KEY=VALUE (repeatable)
    #[arg(short = 'e', long = "env", value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,

    /// Copy a variable from the current environment (repeatable)
    #[arg(long = "pass-env")]
    pub pass_env: Vec<String>,

    /// Timeout (e.g., "30s", "5m"); overrides execution.default_timeout
    #[arg(long)]
    pub timeout: Option<String>,

    /// Label of the action owning the spawn
    #[arg(long, default_value = "//:cli")]
    pub label: String,

    /// Mnemonic of the action owning the spawn
    #[arg(long, default_value = "Exec")]
    pub mnemonic: String,

    /// Skip reading inputs before running
    #[arg(long)]
    pub no_prefetch: bool,

    /// Describe failing commands in full
    #[arg(long)]
    pub verbose_failures: bool,

    /// Log every command line before running it
    #[arg(long)]
    pub report_subcommands: bool,

    /// Redirect the command's stdout to a file
    #[arg(long)]
    pub stdout: Option<PathBuf>,

    /// Redirect the command's stderr to a file
    #[arg(long)]
    pub stderr: Option<PathBuf>,

    /// Command and arguments
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,

    /// Spawn cache directory
    #[arg(long, env = "FABRIK_CONFIG_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// List cached spawns
    List {
        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show cache statistics
    Stats,

    /// Remove one entry, or everything with --all
    Clean {
        /// Cache key to remove
        key: Option<String>,

        /// Clean all entries
        #[arg(long)]
        all: bool,
    },
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Validate {
        /// Path to config file
        path: PathBuf,
    },
    /// Print an example config file
    Example,
    /// Show effective configuration
    Show,
}

/// Parse a KEY=VALUE pair
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
