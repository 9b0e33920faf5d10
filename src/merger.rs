/// Configuration merger: CLI args > Env vars > Config file > Defaults
///
/// Environment variables are already folded into the CLI args by clap.
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CachePolicy;
use crate::cli::ExecArgs;
use crate::config::{parse_duration, SpawnConfig};

/// Merged configuration for the exec command
#[derive(Debug, Clone)]
pub struct MergedExecConfig {
    pub exec_root: PathBuf,
    pub cache_dir: PathBuf,
    pub cache_enabled: bool,
    pub cache_policy: CachePolicy,
    pub cache_ttl: Option<Duration>,
    /// Applied when the spawn declares no timeout
    pub default_timeout: Duration,
    /// Timeout declared on the command line
    pub timeout: Option<Duration>,
    pub verbose_failures: bool,
    pub report_subcommands: bool,
    pub strategy: String,
}

impl MergedExecConfig {
    pub fn merge(args: &ExecArgs, file_config: Option<SpawnConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();
        file.validate()?;

        let timeout = args
            .timeout
            .as_deref()
            .map(parse_duration)
            .transpose()
            .context("Invalid --timeout")?;

        Ok(Self {
            exec_root: args
                .exec_root
                .clone()
                .unwrap_or_else(|| PathBuf::from(&file.execution.exec_root)),
            cache_dir: args
                .cache_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(&file.cache.dir)),
            cache_enabled: !args.no_cache && file.cache.enabled,
            cache_policy: CachePolicy {
                read_only: args.read_only || file.cache.read_only,
                accept_failed_results: args.cache_failures || file.cache.accept_failed_results,
            },
            cache_ttl: file.cache_ttl()?,
            default_timeout: file.default_timeout()?,
            timeout,
            verbose_failures: args.verbose_failures || file.execution.verbose_failures,
            report_subcommands: args.report_subcommands || file.execution.report_subcommands,
            strategy: file.execution.strategy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn exec_args(extra: &[&str]) -> ExecArgs {
        let mut argv = vec!["fabrik-spawn", "exec"];
        argv.extend_from_slice(extra);
        argv.extend_from_slice(&["--", "true"]);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Exec(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = SpawnConfig::default();
        file.cache.dir = "/from/file".to_string();
        file.execution.default_timeout = "1m".to_string();

        let merged = MergedExecConfig::merge(
            &exec_args(&["--cache-dir", "/from/cli", "--read-only", "--timeout", "5s"]),
            Some(file),
        )
        .unwrap();

        assert_eq!(merged.cache_dir, PathBuf::from("/from/cli"));
        assert!(merged.cache_policy.read_only);
        assert_eq!(merged.timeout, Some(Duration::from_secs(5)));
        assert_eq!(merged.default_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_file_values_used_without_flags() {
        let mut file = SpawnConfig::default();
        file.cache.enabled = false;
        file.cache.ttl = "0s".to_string();
        file.execution.exec_root = "/work".to_string();
        file.execution.strategy = "sandboxed".to_string();

        let merged = MergedExecConfig::merge(&exec_args(&[]), Some(file)).unwrap();
        assert!(!merged.cache_enabled);
        assert_eq!(merged.cache_ttl, None);
        assert_eq!(merged.exec_root, PathBuf::from("/work"));
        assert_eq!(merged.strategy, "sandboxed");
        assert_eq!(merged.timeout, None);
    }

    #[test]
    fn test_invalid_timeout_flag() {
        assert!(MergedExecConfig::merge(&exec_args(&["--timeout", "soon"]), None).is_err());
    }
}
