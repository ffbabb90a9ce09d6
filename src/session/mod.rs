//! Session bootstrap: the day start time and the signed-in identity, fetched
//! side by side.
//!
//! The two lookups run concurrently and are cached independently, each with
//! its own freshness window: the setting through the settings cache's memory
//! tier (10 minutes by default), the identity here (5 minutes). Either may
//! finish first, and a failed identity lookup never holds back the setting.
//! Each half is bounded by a lookup timeout, so a hung remote degrades to the
//! default day start or a failed identity instead of stalling the load.

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpIdentitySource;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::day::{resolve_logical_day, LogicalDay};
use crate::error::RemoteError;
use crate::settings::{DayStartSettingCache, SettingSource, SettingsCacheEntry};
use crate::staleness::{check_staleness_at, log_staleness};

pub const DEFAULT_IDENTITY_STALENESS: Duration = Duration::from_secs(5 * 60);

pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// The signed-in user as reported by the identity endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Who is signed in. Authentication itself is handled elsewhere.
#[async_trait::async_trait]
pub trait IdentitySource: Send + Sync {
    /// `Ok(None)` means nobody is signed in.
    async fn fetch_identity(&self) -> Result<Option<Identity>, RemoteError>;

    fn name(&self) -> &str;
}

/// Identity source for offline use. Always signed out.
pub struct NullIdentitySource;

#[async_trait::async_trait]
impl IdentitySource for NullIdentitySource {
    async fn fetch_identity(&self) -> Result<Option<Identity>, RemoteError> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Outcome of one lookup inside a [`SessionSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum Lookup<T> {
    Ready(T),
    Failed(String),
}

impl<T> Lookup<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Lookup::Ready(value) => Some(value),
            Lookup::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Lookup::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub day_start: SettingsCacheEntry,
    pub identity: Lookup<Option<Identity>>,
    pub today: LogicalDay,
}

/// A single value with a fetch timestamp.
struct TimedCell<T> {
    label: &'static str,
    staleness: Duration,
    slot: Mutex<Option<(T, DateTime<Utc>)>>,
}

impl<T: Clone> TimedCell<T> {
    fn new(label: &'static str, staleness: Duration) -> Self {
        Self {
            label,
            staleness,
            slot: Mutex::new(None),
        }
    }

    fn fresh(&self, now: DateTime<Utc>) -> Option<T> {
        let slot = self.slot.lock().expect("session cell lock poisoned");
        let check = check_staleness_at(slot.as_ref().map(|(_, at)| *at), self.staleness, now);
        log_staleness(self.label, &check);
        if check.is_stale {
            None
        } else {
            slot.as_ref().map(|(value, _)| value.clone())
        }
    }

    fn store(&self, value: T, at: DateTime<Utc>) {
        *self.slot.lock().expect("session cell lock poisoned") = Some((value, at));
    }

    fn clear(&self) {
        *self.slot.lock().expect("session cell lock poisoned") = None;
    }
}

pub struct SessionLoader {
    settings: Arc<DayStartSettingCache>,
    identity: Arc<dyn IdentitySource>,
    clock: Arc<dyn Clock>,
    identity_cell: TimedCell<Option<Identity>>,
    lookup_timeout: Duration,
}

impl SessionLoader {
    /// Uses the settings cache's clock so both agree on "now".
    pub fn new(settings: Arc<DayStartSettingCache>, identity: Arc<dyn IdentitySource>) -> Self {
        let clock = settings.clock();
        Self {
            settings,
            identity,
            clock,
            identity_cell: TimedCell::new("session.identity", DEFAULT_IDENTITY_STALENESS),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_identity_staleness(mut self, staleness: Duration) -> Self {
        self.identity_cell = TimedCell::new("session.identity", staleness);
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Resolve both lookups concurrently. Returns within roughly the lookup
    /// timeout even if a remote never answers.
    pub async fn load(&self) -> SessionSnapshot {
        let (day_start, identity) = tokio::join!(self.load_day_start(), self.load_identity());
        let today = resolve_logical_day(self.clock.now(), day_start.value);
        SessionSnapshot {
            day_start,
            identity,
            today,
        }
    }

    async fn load_day_start(&self) -> SettingsCacheEntry {
        match tokio::time::timeout(self.lookup_timeout, self.settings.get_entry()).await {
            Ok(entry) => entry,
            Err(_) => {
                warn!(
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "day start lookup timed out, using default"
                );
                SettingsCacheEntry {
                    value: self.settings.default_value(),
                    source: SettingSource::Default,
                    fetched_at: self.clock.now(),
                }
            }
        }
    }

    async fn load_identity(&self) -> Lookup<Option<Identity>> {
        if let Some(identity) = self.identity_cell.fresh(self.clock.now()) {
            return Lookup::Ready(identity);
        }
        let fetched = tokio::time::timeout(self.lookup_timeout, self.identity.fetch_identity());
        let Ok(result) = fetched.await else {
            warn!(
                source = self.identity.name(),
                timeout_ms = self.lookup_timeout.as_millis() as u64,
                "identity lookup timed out"
            );
            return Lookup::Failed(format!(
                "identity lookup timed out after {}ms",
                self.lookup_timeout.as_millis()
            ));
        };
        match result {
            Ok(identity) => {
                debug!(
                    source = self.identity.name(),
                    signed_in = identity.is_some(),
                    "identity resolved"
                );
                self.identity_cell.store(identity.clone(), self.clock.now());
                Lookup::Ready(identity)
            }
            Err(err) => {
                warn!(source = self.identity.name(), error = %err, "identity lookup failed");
                Lookup::Failed(err.to_string())
            }
        }
    }

    /// Forget the cached identity, e.g. after the user signs out.
    pub fn invalidate_identity(&self) {
        self.identity_cell.clear();
    }
}
