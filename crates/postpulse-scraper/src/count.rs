//! Engagement counter normalization.

use std::sync::LazyLock;

use regex::Regex;

static COMPACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+(?:\.[0-9]+)?)\s*([kKmM])\b").expect("valid compact count regex")
});
static DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("valid digit regex"));

/// Convert a displayed counter ("1.2K", "6 comments", "1,234") to an integer.
///
/// A leading compact form (`1.2k`, `3 M`) is scaled by its suffix. Otherwise
/// the first run of digits is taken as-is, which means thousands separators
/// truncate: `"1,234"` parses as `1`. Text without digits yields `0`.
#[must_use]
pub fn parse_count(text: &str) -> u64 {
    let trimmed = text.trim();

    if let Some(caps) = COMPACT_RE.captures(trimmed) {
        let multiplier = match &caps[2] {
            "k" | "K" => 1_000.0,
            _ => 1_000_000.0,
        };
        if let Ok(value) = caps[1].parse::<f64>() {
            return scale(value, multiplier);
        }
    }

    DIGITS_RE
        .find(trimmed)
        .map_or(0, |m| m.as_str().parse::<u64>().unwrap_or(u64::MAX))
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn scale(value: f64, multiplier: f64) -> u64 {
    let scaled = (value * multiplier).round();
    if scaled >= u64::MAX as f64 {
        u64::MAX
    } else {
        scaled as u64
    }
}
