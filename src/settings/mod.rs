//! The day-start-time setting across its three tiers.
//!
//! Reads go memory -> local store -> remote store -> built-in default. Writes
//! land in the local store synchronously and reach the remote store from a
//! background task. The local store is authoritative for the session: a remote
//! fetch that started before a local write never overwrites it.

mod cache;
mod local;
#[cfg(feature = "http")]
mod remote;

pub use cache::{
    DayStartSettingCache, PropagationHandle, PropagationOutcome, DEFAULT_SETTING_STALENESS,
};
pub use local::{JsonFileLocalStore, MemoryLocalStore};
#[cfg(feature = "http")]
pub use remote::HttpSettingsRemote;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::day::DayStartTime;
use crate::error::RemoteError;

/// Key under which the setting is kept in the local store.
pub const SETTING_KEY: &str = "dayStartTime";

/// Device-local key-value string storage.
///
/// Operations are synchronous so a write is visible to the very next read.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// The authoritative, server-side copy of the setting.
#[async_trait::async_trait]
pub trait SettingsRemote: Send + Sync {
    /// Returns `Ok(None)` when the user has never saved the setting.
    async fn fetch_day_start_time(&self) -> Result<Option<DayStartTime>, RemoteError>;

    async fn put_day_start_time(&self, value: DayStartTime) -> Result<(), RemoteError>;

    fn name(&self) -> &str;
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingSource {
    Local,
    Remote,
    Default,
}

impl SettingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingSource::Local => "local",
            SettingSource::Remote => "remote",
            SettingSource::Default => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsCacheEntry {
    pub value: DayStartTime,
    pub source: SettingSource,
    pub fetched_at: DateTime<Utc>,
}

/// Outcome of background work, published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsEvent {
    Propagated { value: DayStartTime },
    PropagationFailed { value: DayStartTime, error: String },
    /// A prefetch task was aborted before its read finished. Nothing was cached.
    PrefetchAbandoned,
}

/// Stand-in remote for offline use: nothing to fetch, nowhere to write.
pub struct NullSettingsRemote;

#[async_trait::async_trait]
impl SettingsRemote for NullSettingsRemote {
    async fn fetch_day_start_time(&self) -> Result<Option<DayStartTime>, RemoteError> {
        Ok(None)
    }

    async fn put_day_start_time(&self, _value: DayStartTime) -> Result<(), RemoteError> {
        Err(RemoteError::Transport("no remote configured".to_string()))
    }

    fn name(&self) -> &str {
        "null"
    }
}
