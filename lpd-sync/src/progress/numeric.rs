//! Numeric policy for progress values
//!
//! Every percentage the engine hands out is clamped to [0, 100] and rounded
//! to two decimals. Non-numeric, missing, NaN and infinite inputs become 0.

use serde_json::Value;

/// Clamp to [0, 100] and round to two decimals
pub fn normalize(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    round2(value.clamp(0.0, 100.0))
}

/// Normalize a loosely typed JSON value; only numbers count
pub fn normalize_json_value(value: &Value) -> f64 {
    value.as_f64().map(normalize).unwrap_or(0.0)
}

/// Round to two decimals; non-finite values become 0
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 100.0).round() / 100.0
}

/// `completed / total` as a normalized percentage (0 when `total` is 0)
pub fn ratio_percentage(completed: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    normalize(f64::from(completed) / f64::from(total) * 100.0)
}

/// Render a percentage without trailing zeros: `50%`, `33.33%`, `12.5%`
pub fn format_percentage(value: f64) -> String {
    let normalized = normalize(value);
    if normalized.fract() == 0.0 {
        return format!("{}%", normalized as u32);
    }
    let fixed = format!("{:.2}", normalized);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{}%", trimmed)
}

/// Convert a free-form duration ("2h", "45 min", "1.5 days", "1 week") to hours
///
/// The first number in the text is the amount; the unit is picked by
/// keyword (day, week, min) and defaults to hours. Text without a number
/// yields 0.
pub fn parse_estimated_time_to_hours(estimate: &str) -> f64 {
    let text = estimate.trim().to_lowercase();
    let Some(amount) = first_number(&text) else {
        return 0.0;
    };

    if text.contains("day") {
        amount * 24.0
    } else if text.contains("week") {
        amount * 24.0 * 7.0
    } else if text.contains("min") {
        amount / 60.0
    } else {
        amount
    }
}

/// Leftmost `digits[.digits]` or `.digits` run in `text`
fn first_number(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let is_digit = |i: usize| bytes.get(i).is_some_and(u8::is_ascii_digit);

    let start = (0..bytes.len())
        .find(|&i| is_digit(i) || (bytes[i] == b'.' && is_digit(i + 1)))?;

    let mut end = start;
    while is_digit(end) {
        end += 1;
    }
    if bytes.get(end) == Some(&b'.') && is_digit(end + 1) {
        end += 1;
        while is_digit(end) {
            end += 1;
        }
    }

    text[start..end].parse().ok()
}
