/// `fabrik-spawn cache` command implementation
///
/// Lists, summarizes and cleans spawn cache entries.
use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::cache::{CachePolicy, DiskSpawnCache};
use crate::cli::{CacheArgs, CacheCommands};
use crate::cli_utils::{format_size, prefix};
use crate::config::SpawnConfig;

pub fn run(args: &CacheArgs, file_config: Option<SpawnConfig>) -> Result<()> {
    let cache_dir = args
        .cache_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(file_config.unwrap_or_default().cache.dir));
    let cache = DiskSpawnCache::new(&cache_dir, CachePolicy::default())
        .context("Failed to initialize spawn cache")?;

    match &args.command {
        CacheCommands::List { verbose } => list(&cache, *verbose),
        CacheCommands::Stats => stats(&cache),
        CacheCommands::Clean { key, all } => clean(&cache, key.as_deref(), *all),
    }
}

/// List all cached spawns
fn list(cache: &DiskSpawnCache, verbose: bool) -> Result<()> {
    let entries = cache.list().context("Failed to list cache entries")?;

    if entries.is_empty() {
        println!("No cached spawns.");
        return Ok(());
    }

    println!("Cached spawns ({} entries):", entries.len());
    println!();

    for cache_key in entries {
        // Read-only: listing never discards stale entries
        let Some(entry) = cache.read_entry(&cache_key)? else {
            continue;
        };

        if entry.is_expired() {
            println!("  {} (expired)", cache_key);
        } else {
            println!("  {}", cache_key);
        }
        println!(
            "    Action: {} ({})",
            entry.metadata.label, entry.metadata.mnemonic
        );
        println!(
            "    Created: {}",
            entry.metadata.created_at.format("%Y-%m-%d %H:%M:%S")
        );

        if verbose {
            let result = &entry.metadata.result;
            println!("    Status: {}", result.status());
            if let Some(code) = result.exit_code() {
                println!("    Exit code: {}", code);
            }
            if let Some(wall_time) = result.wall_time() {
                println!("    Duration: {:.2}s", wall_time.as_secs_f64());
            }
            match entry.metadata.expires_at {
                Some(expires_at) => {
                    println!("    Expires: {}", expires_at.format("%Y-%m-%d %H:%M:%S"))
                }
                None => println!("    Expires: Never"),
            }
            let total_size: u64 = entry.metadata.outputs.iter().map(|o| o.size_bytes).sum();
            println!(
                "    Outputs: {} ({})",
                entry.metadata.outputs.len(),
                format_size(total_size)
            );
            for output in &entry.metadata.outputs {
                println!("      {}", output.path);
            }
        }

        println!();
    }

    Ok(())
}

/// Show cache statistics
fn stats(cache: &DiskSpawnCache) -> Result<()> {
    let stats = cache.stats().context("Failed to get cache statistics")?;

    println!("Spawn Cache Statistics");
    println!();
    println!("Location: {}", cache.dir().display());
    println!("Total entries: {}", stats.total_entries);
    println!("Total size: {}", format_size(stats.total_size_bytes));
    println!("Total files: {}", stats.total_files);

    if stats.total_entries > 0 {
        println!(
            "Average size per entry: {}",
            format_size(stats.total_size_bytes / stats.total_entries as u64)
        );
    }

    Ok(())
}

/// Clean one entry or the whole cache
fn clean(cache: &DiskSpawnCache, key: Option<&str>, all: bool) -> Result<()> {
    if all {
        println!("{} Cleaning all spawn cache entries...", prefix());
        cache.clean_all().context("Failed to clean all caches")?;
        println!("{} Spawn cache cleaned.", prefix());
        return Ok(());
    }

    let Some(key) = key else {
        anyhow::bail!("Specify --all to clean all entries, or provide a cache key");
    };

    if !cache.contains(key) {
        anyhow::bail!("No cache entry with key: {}", key);
    }

    cache
        .remove(key)
        .with_context(|| format!("Failed to remove cache entry {}", key))?;
    println!("{} Removed {}", prefix(), key);

    Ok(())
}
