//! Duration phrases in feed text.
//!
//! Feed descriptions mix Dutch and English ("2 uur", "45 minuten",
//! "1 hour"). Durations are normalized to a compact "{n}h" / "{n}m" form
//! for display and statistics.

use regex::Regex;

/// Scan free text for the first duration phrase and normalize it.
/// Returns `None` when the text carries no recognizable duration.
pub fn extract_duration(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }

    let pattern = Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(uur|hour|minuten|minutes|min|h)").ok()?;
    let caps = pattern.captures(text)?;

    let value: f64 = caps[1].parse().ok()?;
    let unit = caps[2].to_lowercase();

    if unit.contains("uur") || unit.contains("hour") || unit == "h" {
        Some(format!("{}h", format_number(value)))
    } else {
        Some(format!("{}m", format_number(value)))
    }
}

/// Parse a normalized duration ("30m", "1.5h") into minutes.
/// Unparseable input counts as zero.
pub fn parse_duration_minutes(duration: &str) -> f64 {
    let Ok(pattern) = Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*([hm])") else {
        return 0.0;
    };
    let Some(caps) = pattern.captures(duration) else {
        return 0.0;
    };
    let Ok(value) = caps[1].parse::<f64>() else {
        return 0.0;
    };

    if caps[2].eq_ignore_ascii_case("h") {
        value * 60.0
    } else {
        value
    }
}

/// Format a numeric value the way it reads in feed text: whole values
/// without a decimal point.
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
