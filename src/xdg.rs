//! XDG Base Directory support
//!
//! - `$XDG_CACHE_HOME/fabrik/` (default: `~/.cache/fabrik/`) - spawn cache
//! - `$XDG_CONFIG_HOME/fabrik/` (default: `~/.config/fabrik/`) - global configuration

use std::path::PathBuf;

/// Cache directory; respects XDG_CACHE_HOME
pub fn cache_dir() -> PathBuf {
    if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg_cache).join("fabrik")
    } else if let Some(cache) = dirs::cache_dir() {
        cache.join("fabrik")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".cache").join("fabrik")
    } else {
        PathBuf::from(".fabrik-cache")
    }
}

/// Configuration directory; respects XDG_CONFIG_HOME
///
/// Always `~/.config/fabrik` when XDG_CONFIG_HOME is unset, on every platform.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        Some(PathBuf::from(xdg_config).join("fabrik"))
    } else {
        dirs::home_dir().map(|home| home.join(".config").join("fabrik"))
    }
}
