/// Human-readable formatting for byte counts and durations.
///
/// Sizes stay `u64` bytes internally; floats appear only here.

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format a byte count with binary (1024) steps and short unit labels.
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    match unit {
        0 => format!("{bytes} B"),
        1 | 2 => format!("{value:.1} {}", UNITS[unit]),
        _ => format!("{value:.2} {}", UNITS[unit]),
    }
}

/// Format a signed byte delta, e.g. `+1.5 KB` / `-300 B`.
pub fn format_size_delta(diff: i64) -> String {
    let sign = if diff < 0 { '-' } else { '+' };
    format!("{sign}{}", format_size(diff.unsigned_abs()))
}

/// Format milliseconds as `850 ms`, `12.3 s` or `4m 05s`.
pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1_000 {
        format!("{ms} ms")
    } else if ms < 60_000 {
        format!("{:.1} s", ms as f64 / 1_000.0)
    } else {
        let secs = ms / 1_000;
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}
