//! Human-readable durations for staleness windows ("10m", "5m", "1h30m").

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{de, Deserialize, Deserializer};

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

fn unit_secs(unit: char) -> Option<u64> {
    match unit {
        'd' => Some(SECS_PER_DAY),
        'h' => Some(SECS_PER_HOUR),
        'm' => Some(SECS_PER_MINUTE),
        's' => Some(1),
        _ => None,
    }
}

/// Parse a duration made of one or more `<number><unit>` segments.
///
/// Units are `d`, `h`, `m` and `s`. Segments add up, so "1h30m" is ninety
/// minutes. Input is trimmed and case-insensitive.
///
/// ```
/// use daybook::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
/// assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let input = s.trim().to_ascii_lowercase();
    if input.is_empty() {
        bail!("Duration is empty");
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in input.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let scale = unit_secs(c)
            .with_context(|| format!("Unknown duration unit {c:?} in {s:?}"))?;
        if digits.is_empty() {
            bail!("Missing number before {c:?} in {s:?}");
        }
        let n: u64 = digits
            .parse()
            .with_context(|| format!("Invalid number in duration {s:?}"))?;
        let secs = n.checked_mul(scale).context("Duration is too large")?;
        total = total.checked_add(secs).context("Duration is too large")?;
        digits.clear();
    }
    if !digits.is_empty() {
        bail!("Duration {s:?} must end with d, h, m, or s");
    }

    Ok(Duration::from_secs(total))
}

/// Format a duration using every non-zero unit, largest first.
///
/// Sub-second precision is dropped.
pub fn format_duration(d: Duration) -> String {
    let mut secs = d.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    let units = [
        ('d', SECS_PER_DAY),
        ('h', SECS_PER_HOUR),
        ('m', SECS_PER_MINUTE),
        ('s', 1),
    ];
    for (unit, scale) in units {
        let n = secs / scale;
        if n > 0 {
            out.push_str(&format!("{n}{unit}"));
            secs %= scale;
        }
    }
    out
}

/// Serde adapter: `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}
