/// CLI output helpers
use std::io::IsTerminal;

/// Prefix for user-facing messages; bright cyan when stderr is a TTY
pub fn prefix() -> &'static str {
    if std::io::stderr().is_terminal() {
        "\x1b[96m[fabrik-spawn]\x1b[0m"
    } else {
        "[fabrik-spawn]"
    }
}

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1000.0 && unit < UNITS.len() - 1 {
        size /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}
