use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::cache::CachePolicy;
use crate::logging::LogFormat;
use crate::xdg;

/// Complete configuration (loaded from TOML file)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SpawnConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Spawn cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory path
    #[serde(default = "default_cache_dir")]
    pub dir: String,

    /// Look up and store spawn results at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Serve hits but never store
    #[serde(default)]
    pub read_only: bool,

    /// Also store results of spawns that did not succeed
    #[serde(default)]
    pub accept_failed_results: bool,

    /// Entry time-to-live ("0s" disables expiry)
    #[serde(default = "default_ttl")]
    pub ttl: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            enabled: true,
            read_only: false,
            accept_failed_results: false,
            ttl: default_ttl(),
        }
    }
}

/// Execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Directory spawns run in; declared paths are relative to it
    #[serde(default = "default_exec_root")]
    pub exec_root: String,

    /// Describe failed commands in full (working directory, environment)
    #[serde(default)]
    pub verbose_failures: bool,

    /// Log every command line before it runs
    #[serde(default)]
    pub report_subcommands: bool,

    /// Applied to spawns that declare no timeout ("0s" = unlimited)
    #[serde(default = "default_timeout")]
    pub default_timeout: String,

    /// Strategy label reported in progress events
    #[serde(default = "default_strategy")]
    pub strategy: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            exec_root: default_exec_root(),
            verbose_failures: false,
            report_subcommands: false,
            default_timeout: default_timeout(),
            strategy: default_strategy(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_cache_dir() -> String {
    xdg::cache_dir().to_string_lossy().to_string()
}

fn default_ttl() -> String {
    "7d".to_string()
}

fn default_exec_root() -> String {
    ".".to_string()
}

fn default_timeout() -> String {
    "0s".to_string()
}

fn default_strategy() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_true() -> bool {
    true
}

/// Parse duration string (e.g., "30s", "10m", "1h", "7d")
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(anyhow!("Empty duration string"));
    }

    let (num_str, unit) = s.split_at(s.len() - 1);
    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| anyhow!("Invalid duration: {}", s))?;

    let seconds = match unit {
        "s" => num,
        "m" => num * 60,
        "h" => num * 3600,
        "d" => num * 86400,
        _ => return Err(anyhow!("Invalid duration unit: {}. Use: s, m, h, d", unit)),
    };

    Ok(Duration::from_secs(seconds))
}

impl SpawnConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: SpawnConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Example configuration for `fabrik-spawn config example`
    pub fn example() -> Result<String> {
        let config = SpawnConfig {
            cache: CacheConfig {
                dir: ".fabrik/spawn-cache".to_string(),
                ttl: "14d".to_string(),
                ..Default::default()
            },
            execution: ExecutionConfig {
                verbose_failures: true,
                default_timeout: "10m".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        toml::to_string_pretty(&config).context("Failed to serialize example config")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache.dir.is_empty() {
            anyhow::bail!("cache.dir must be set");
        }

        parse_duration(&self.cache.ttl).context("cache.ttl is not a valid duration")?;
        parse_duration(&self.execution.default_timeout)
            .context("execution.default_timeout is not a valid duration")?;

        if self.execution.exec_root.is_empty() {
            anyhow::bail!("execution.exec_root must be set");
        }

        if self.execution.strategy.trim().is_empty() {
            anyhow::bail!("execution.strategy must not be empty");
        }

        if !["trace", "debug", "info", "warn", "error"]
            .contains(&self.observability.log_level.as_str())
        {
            anyhow::bail!("observability.log_level must be one of: trace, debug, info, warn, error");
        }

        if LogFormat::parse(&self.observability.log_format).is_none() {
            anyhow::bail!("observability.log_format must be one of: pretty, compact, json");
        }

        Ok(())
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            read_only: self.cache.read_only,
            accept_failed_results: self.cache.accept_failed_results,
        }
    }

    /// Entry TTL; `None` when expiry is disabled
    pub fn cache_ttl(&self) -> Result<Option<Duration>> {
        let ttl = parse_duration(&self.cache.ttl)?;
        Ok((!ttl.is_zero()).then_some(ttl))
    }

    pub fn default_timeout(&self) -> Result<Duration> {
        parse_duration(&self.execution.default_timeout)
    }

    pub fn log_format(&self) -> LogFormat {
        LogFormat::parse(&self.observability.log_format).unwrap_or(LogFormat::Pretty)
    }
}
