//! Freshness checks for cached lookups.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::duration::format_duration;

/// Result of a staleness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalenessCheck {
    pub is_stale: bool,
    pub age: Option<Duration>,
    pub threshold: Duration,
}

impl StalenessCheck {
    pub fn stale(age: Duration, threshold: Duration) -> Self {
        Self { is_stale: true, age: Some(age), threshold }
    }

    pub fn fresh(age: Duration, threshold: Duration) -> Self {
        Self { is_stale: false, age: Some(age), threshold }
    }

    pub fn missing(threshold: Duration) -> Self {
        Self { is_stale: true, age: None, threshold }
    }
}

/// Check whether something fetched at `fetched_at` is still fresh at `now`.
///
/// An entry whose age equals the threshold is stale. A timestamp in the
/// future (clock skew) counts as age zero.
pub fn check_staleness_at(
    fetched_at: Option<DateTime<Utc>>,
    threshold: Duration,
    now: DateTime<Utc>,
) -> StalenessCheck {
    match fetched_at {
        Some(at) => {
            let age = (now - at).to_std().unwrap_or(Duration::ZERO);
            if age >= threshold {
                StalenessCheck::stale(age, threshold)
            } else {
                StalenessCheck::fresh(age, threshold)
            }
        }
        None => StalenessCheck::missing(threshold),
    }
}

pub fn log_staleness(lookup: &str, check: &StalenessCheck) {
    let status = if check.is_stale { "stale" } else { "fresh" };
    let age_str = check
        .age
        .map(format_duration)
        .unwrap_or_else(|| "never".to_string());

    debug!(
        lookup = lookup,
        age = %age_str,
        threshold = %format_duration(check.threshold),
        status = status,
        "lookup staleness check"
    );
}
