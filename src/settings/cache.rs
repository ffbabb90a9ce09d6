use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::day::{DayStartError, DayStartTime};
use crate::staleness::{check_staleness_at, log_staleness};

use super::{
    LocalStore, SettingSource, SettingsCacheEntry, SettingsEvent, SettingsRemote, SETTING_KEY,
};

/// How long the in-memory tier serves a value before re-reading the lower tiers.
pub const DEFAULT_SETTING_STALENESS: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Default)]
struct CacheState {
    memory: Option<SettingsCacheEntry>,
    /// Bumped by every local write and invalidation. A read that observed an
    /// older generation must not publish what it fetched.
    generation: u64,
    /// Bumped by local writes only. Propagation of an older write is skipped.
    writes: u64,
}

/// Result of pushing a local write to the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagationOutcome {
    Propagated,
    /// A newer local write exists and will be propagated instead.
    Superseded,
    Failed(String),
}

/// Handle to a background propagation. Dropping it does not cancel the task.
#[derive(Debug)]
pub struct PropagationHandle {
    task: JoinHandle<PropagationOutcome>,
}

impl PropagationHandle {
    pub async fn wait(self) -> PropagationOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => PropagationOutcome::Failed(err.to_string()),
        }
    }
}

/// Owns the day-start-time setting for one session.
///
/// Construct once and share it (`Arc`) with everything that needs the value.
pub struct DayStartSettingCache {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn SettingsRemote>,
    clock: Arc<dyn Clock>,
    staleness: Duration,
    default: DayStartTime,
    state: Arc<Mutex<CacheState>>,
    // Serializes remote writes so an older value cannot land after a newer one.
    propagation: Arc<AsyncMutex<()>>,
    events: broadcast::Sender<SettingsEvent>,
}

impl DayStartSettingCache {
    pub fn new(local: Arc<dyn LocalStore>, remote: Arc<dyn SettingsRemote>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            local,
            remote,
            clock: Arc::new(SystemClock),
            staleness: DEFAULT_SETTING_STALENESS,
            default: DayStartTime::DEFAULT,
            state: Arc::new(Mutex::new(CacheState::default())),
            propagation: Arc::new(AsyncMutex::new(())),
            events,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn with_default(mut self, default: DayStartTime) -> Self {
        self.default = default;
        self
    }

    pub fn default_value(&self) -> DayStartTime {
        self.default
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Subscribe to background propagation results.
    pub fn subscribe(&self) -> broadcast::Receiver<SettingsEvent> {
        self.events.subscribe()
    }

    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().expect("settings cache lock poisoned")
    }

    /// The current day start time. Never fails; degrades to the default.
    pub async fn get_day_start_time(&self) -> DayStartTime {
        self.get_entry().await.value
    }

    /// Like [`get_day_start_time`](Self::get_day_start_time), with provenance.
    pub async fn get_entry(&self) -> SettingsCacheEntry {
        let now = self.clock.now();
        let generation = {
            let state = self.lock_state();
            if let Some(entry) = &state.memory {
                let check = check_staleness_at(Some(entry.fetched_at), self.staleness, now);
                log_staleness("day_start_time", &check);
                if !check.is_stale {
                    return entry.clone();
                }
            }
            state.generation
        };

        if let Some(value) = self.read_local(generation) {
            let entry = SettingsCacheEntry {
                value,
                source: SettingSource::Local,
                fetched_at: now,
            };
            return self.adopt(generation, entry, false);
        }

        match self.remote.fetch_day_start_time().await {
            Ok(Some(value)) => {
                info!(
                    remote = self.remote.name(),
                    day_start_time = %value,
                    "fetched day start time from remote"
                );
                let entry = SettingsCacheEntry {
                    value,
                    source: SettingSource::Remote,
                    fetched_at: self.clock.now(),
                };
                self.adopt(generation, entry, true)
            }
            Ok(None) => {
                debug!(remote = self.remote.name(), "remote has no day start time");
                self.fallback(generation)
            }
            Err(err) => {
                warn!(
                    remote = self.remote.name(),
                    error = %err,
                    "failed to fetch day start time; using default"
                );
                self.fallback(generation)
            }
        }
    }

    /// The cached value, if any tier below the remote has one. Never fetches.
    pub fn peek(&self) -> Option<DayStartTime> {
        let generation = {
            let state = self.lock_state();
            if let Some(entry) = &state.memory {
                return Some(entry.value);
            }
            state.generation
        };
        self.read_local(generation)
    }

    fn read_local(&self, generation: u64) -> Option<DayStartTime> {
        match self.local.get(SETTING_KEY) {
            Ok(Some(raw)) => match raw.parse() {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(value = %raw, error = %err, "discarding invalid cached day start time");
                    let state = self.lock_state();
                    if state.generation == generation {
                        if let Err(err) = self.local.remove(SETTING_KEY) {
                            warn!(error = %err, "failed to remove invalid cached day start time");
                        }
                    }
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "failed to read local settings cache");
                None
            }
        }
    }

    /// Publish a value read from a lower tier, unless a write landed meanwhile.
    fn adopt(
        &self,
        generation: u64,
        entry: SettingsCacheEntry,
        persist: bool,
    ) -> SettingsCacheEntry {
        let mut state = self.lock_state();
        if state.generation != generation {
            debug!(
                fetched = %entry.value,
                "discarding read that started before a newer local change"
            );
            return state.memory.clone().unwrap_or(entry);
        }

        if persist {
            if let Err(err) = self.local.set(SETTING_KEY, &entry.value.to_string()) {
                warn!(error = %err, "failed to populate local settings cache");
            }
        }
        state.memory = Some(entry.clone());
        entry
    }

    fn fallback(&self, generation: u64) -> SettingsCacheEntry {
        let state = self.lock_state();
        if state.generation != generation {
            if let Some(newer) = &state.memory {
                return newer.clone();
            }
        }
        SettingsCacheEntry {
            value: self.default,
            source: SettingSource::Default,
            fetched_at: self.clock.now(),
        }
    }

    /// Store `value` locally right away, then push it to the remote store in
    /// the background. Must be called from within a tokio runtime.
    pub fn update_day_start_time(&self, value: DayStartTime) -> PropagationHandle {
        let write = {
            let mut state = self.lock_state();
            if let Err(err) = self.local.set(SETTING_KEY, &value.to_string()) {
                warn!(error = %err, "failed to write day start time to local cache");
            }
            state.generation += 1;
            state.writes += 1;
            state.memory = Some(SettingsCacheEntry {
                value,
                source: SettingSource::Local,
                fetched_at: self.clock.now(),
            });
            state.writes
        };
        info!(day_start_time = %value, "day start time updated locally");

        let remote = Arc::clone(&self.remote);
        let state = Arc::clone(&self.state);
        let propagation = Arc::clone(&self.propagation);
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            let _guard = propagation.lock().await;
            let latest = state.lock().expect("settings cache lock poisoned").writes;
            if latest != write {
                debug!(day_start_time = %value, "skipping propagation of superseded write");
                return PropagationOutcome::Superseded;
            }

            match remote.put_day_start_time(value).await {
                Ok(()) => {
                    info!(
                        remote = remote.name(),
                        day_start_time = %value,
                        "propagated day start time"
                    );
                    // No subscribers is fine.
                    let _ = events.send(SettingsEvent::Propagated { value });
                    PropagationOutcome::Propagated
                }
                Err(err) => {
                    warn!(
                        remote = remote.name(),
                        day_start_time = %value,
                        error = %err,
                        "failed to propagate day start time; keeping local value"
                    );
                    let error = err.to_string();
                    let _ = events.send(SettingsEvent::PropagationFailed {
                        value,
                        error: error.clone(),
                    });
                    PropagationOutcome::Failed(error)
                }
            }
        });

        PropagationHandle { task }
    }

    /// Validate raw "HH:MM" input and apply it with
    /// [`update_day_start_time`](Self::update_day_start_time).
    pub fn update_day_start_time_str(&self, raw: &str) -> Result<PropagationHandle, DayStartError> {
        let value: DayStartTime = raw.trim().parse()?;
        Ok(self.update_day_start_time(value))
    }

    /// Drop the memory and local tiers. The next read goes to the remote.
    pub fn invalidate(&self) -> Result<()> {
        let mut state = self.lock_state();
        state.generation += 1;
        state.memory = None;
        self.local
            .remove(SETTING_KEY)
            .context("Failed to clear local settings cache")?;
        debug!("settings cache invalidated");
        Ok(())
    }

    /// Warm the cache in the background. Aborting the returned task leaves the
    /// cache untouched unless the fetch had already completed, and publishes
    /// [`SettingsEvent::PrefetchAbandoned`].
    pub fn prefetch(self: &Arc<Self>) -> JoinHandle<SettingsCacheEntry> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut guard = PrefetchGuard {
                events: cache.events.clone(),
                finished: false,
            };
            let entry = cache.get_entry().await;
            guard.finished = true;
            entry
        })
    }
}

/// Reports a prefetch whose task was dropped before the read finished.
struct PrefetchGuard {
    events: broadcast::Sender<SettingsEvent>,
    finished: bool,
}

impl Drop for PrefetchGuard {
    fn drop(&mut self) {
        if !self.finished {
            debug!("day start prefetch abandoned before completion");
            let _ = self.events.send(SettingsEvent::PrefetchAbandoned);
        }
    }
}
