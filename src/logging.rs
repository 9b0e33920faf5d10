//! Structured logging for spawn execution
//!
//! All logs use structured fields for easy parsing and analysis.
//!
//! # Log Format Conventions
//!
//! - `service`: The component logging ("exec.coordinator", "exec.spawn_cache", ...)
//! - `operation`: The operation being performed ("get", "put", "exec")
//! - `status`: The result status ("success", "miss", "error")
//! - `attempt`: Execution attempt id
//! - `cache_key`: Spawn cache key
//!
//! # Examples
//!
//! ```rust
//! use fabrik_spawn::logging::{operations, services, status};
//! use tracing::info;
//!
//! let key = "spawn-0123";
//! info!(
//!     service = services::SPAWN_CACHE,
//!     operation = operations::GET,
//!     status = status::MISS,
//!     cache_key = key,
//!     "cache miss"
//! );
//! ```

use std::{fmt as std_fmt, io};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    fmt::{self, format::Writer},
    prelude::*,
    EnvFilter,
};

/// Formatter that prints "fabrik" instead of the module path
struct SpawnFormatter {
    with_ansi: bool,
}

impl<S, N> FormatEvent<S, N> for SpawnFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        let meta = event.metadata();

        write!(
            writer,
            "{} ",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6fZ")
        )?;

        if self.with_ansi {
            let level_style = match *meta.level() {
                tracing::Level::ERROR => "\x1b[31m",
                tracing::Level::WARN => "\x1b[33m",
                tracing::Level::INFO => "\x1b[32m",
                tracing::Level::DEBUG => "\x1b[34m",
                tracing::Level::TRACE => "\x1b[35m",
            };
            write!(writer, "{}{:5}(fabrik)\x1b[0m: ", level_style, meta.level())?;
        } else {
            write!(writer, "{:5}(fabrik): ", meta.level())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colored
    Pretty,
    /// Plain single-line (CI)
    Compact,
    /// JSON for log aggregation systems
    Json,
}

impl LogFormat {
    /// Parse a format name; unknown names yield `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }

    /// Read FABRIK_LOG_FORMAT, defaulting to compact in CI and pretty elsewhere
    pub fn from_env() -> Self {
        std::env::var("FABRIK_LOG_FORMAT")
            .ok()
            .and_then(|value| Self::parse(&value))
            .unwrap_or_else(|| {
                if std::env::var("CI").is_ok() {
                    Self::Compact
                } else {
                    Self::Pretty
                }
            })
    }
}

/// Initialize the global subscriber from the environment
///
/// # Environment Variables
///
/// - `RUST_LOG`: log filter (e.g. "debug", "fabrik_spawn=trace")
/// - `FABRIK_LOG_FORMAT`: "pretty", "compact" or "json"
/// - `CI`: if set, defaults to compact format
pub fn init() {
    init_with("info", LogFormat::from_env());
}

/// Initialize with a default level; `RUST_LOG` still takes precedence
///
/// Calling this more than once is harmless: later calls are ignored.
pub fn init_with(default_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .event_format(SpawnFormatter { with_ansi: true })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .event_format(SpawnFormatter { with_ansi: false })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(false)
                    .with_writer(io::stderr)
                    .json(),
            )
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("global subscriber already installed");
    }
}

/// Standard field names for consistent logging
#[allow(dead_code)]
pub mod fields {
    /// Component name (e.g. "exec.coordinator")
    pub const SERVICE: &str = "service";
    /// Operation name (e.g. "get", "put", "exec")
    pub const OPERATION: &str = "operation";
    /// Status (e.g. "success", "miss", "error")
    pub const STATUS: &str = "status";
    /// Execution attempt id
    pub const ATTEMPT: &str = "attempt";
    /// Spawn cache key
    pub const CACHE_KEY: &str = "cache_key";
    /// Runner (strategy) name
    pub const RUNNER: &str = "runner";
    /// Number of entries (for batch operations)
    pub const ENTRY_COUNT: &str = "entry_count";
    /// Size in bytes
    pub const SIZE_BYTES: &str = "size_bytes";
}

/// Service names for consistent logging
pub mod services {
    pub const COORDINATOR: &str = "exec.coordinator";
    pub const SPAWN_CACHE: &str = "exec.spawn_cache";
    pub const EXEC_EVENTS: &str = "exec.events";
    pub const LOCAL_RUNNER: &str = "exec.local";
}

/// Operation names for consistent logging
#[allow(dead_code)]
pub mod operations {
    pub const GET: &str = "get";
    pub const PUT: &str = "put";
    pub const EXEC: &str = "exec";
    pub const PREFETCH: &str = "prefetch";
}

/// Status values for consistent logging
pub mod status {
    pub const SUCCESS: &str = "success";
    pub const MISS: &str = "miss";
    pub const ERROR: &str = "error";
}
