use std::sync::Arc;

use anyhow::Result;
use daybook::settings::{
    DayStartSettingCache, LocalStore, MemoryLocalStore, PropagationOutcome, SettingSource,
    SettingsEvent, SETTING_KEY,
};

mod support;
use support::{fixed_clock, t, ScriptedRemote};

fn cache_with(
    local: &Arc<MemoryLocalStore>,
    remote: &Arc<ScriptedRemote>,
) -> Arc<DayStartSettingCache> {
    Arc::new(DayStartSettingCache::new(local.clone(), remote.clone()).with_clock(fixed_clock()))
}

#[tokio::test]
async fn remote_value_populates_local_and_later_reads_skip_remote() -> Result<()> {
    let local = Arc::new(MemoryLocalStore::new());
    let remote = Arc::new(ScriptedRemote::returning("07:30"));
    let cache = cache_with(&local, &remote);

    let entry = cache.get_entry().await;
    assert_eq!(entry.value, t("07:30"));
    assert_eq!(entry.source, SettingSource::Remote);
    assert_eq!(local.get(SETTING_KEY)?.as_deref(), Some("07:30"));

    assert_eq!(cache.get_day_start_time().await, t("07:30"));
    assert_eq!(remote.fetch_count(), 1);

    // A fresh cache over the same device store never asks the remote.
    let second = cache_with(&local, &remote);
    let entry = second.get_entry().await;
    assert_eq!(entry.value, t("07:30"));
    assert_eq!(entry.source, SettingSource::Local);
    assert_eq!(remote.fetch_count(), 1);

    Ok(())
}

#[tokio::test]
async fn local_value_wins_without_remote_call() -> Result<()> {
    let local = Arc::new(MemoryLocalStore::new());
    local.set(SETTING_KEY, "04:15")?;
    let remote = Arc::new(ScriptedRemote::returning("07:30"));
    let cache = cache_with(&local, &remote);

    assert_eq!(cache.get_day_start_time().await, t("04:15"));
    assert_eq!(remote.fetch_count(), 0);
    Ok(())
}

#[tokio::test]
async fn remote_failure_falls_back_to_default_without_caching() -> Result<()> {
    let local = Arc::new(MemoryLocalStore::new());
    let remote = Arc::new(ScriptedRemote::failing());
    let cache = cache_with(&local, &remote);

    let entry = cache.get_entry().await;
    assert_eq!(entry.value, t("05:00"));
    assert_eq!(entry.source, SettingSource::Default);
    assert_eq!(local.get(SETTING_KEY)?, None);

    // The next read retries the remote and picks up the recovered value.
    remote.set_answer(Ok(Some(t("06:45"))));
    assert_eq!(cache.get_day_start_time().await, t("06:45"));
    assert_eq!(remote.fetch_count(), 2);
    Ok(())
}

#[tokio::test]
async fn remote_without_value_falls_back_to_default() -> Result<()> {
    let local = Arc::new(MemoryLocalStore::new());
    let remote = Arc::new(ScriptedRemote::empty());
    let cache = cache_with(&local, &remote);

    assert_eq!(cache.get_day_start_time().await, t("05:00"));
    assert_eq!(local.get(SETTING_KEY)?, None);
    Ok(())
}

#[tokio::test]
async fn local_write_beats_in_flight_remote_fetch() -> Result<()> {
    let local = Arc::new(MemoryLocalStore::new());
    let remote = Arc::new(ScriptedRemote::returning("05:00").gated());
    let cache = cache_with(&local, &remote);

    let pending = cache.prefetch();
    remote.fetch_started.notified().await;

    let outcome = cache.update_day_start_time(t("06:00")).wait().await;
    assert_eq!(outcome, PropagationOutcome::Propagated);

    remote.release();
    let fetched = pending.await?;
    assert_eq!(fetched.value, t("06:00"));

    assert_eq!(cache.get_day_start_time().await, t("06:00"));
    assert_eq!(local.get(SETTING_KEY)?.as_deref(), Some("06:00"));
    assert_eq!(remote.put_values(), vec![t("06:00")]);
    Ok(())
}

#[tokio::test]
async fn write_is_visible_before_propagation_finishes() -> Result<()> {
    let local = Arc::new(MemoryLocalStore::new());
    let remote = Arc::new(ScriptedRemote::returning("05:00"));
    let cache = cache_with(&local, &remote);

    let handle = cache.update_day_start_time(t("08:00"));
    assert_eq!(local.get(SETTING_KEY)?.as_deref(), Some("08:00"));
    assert_eq!(cache.peek(), Some(t("08:00")));
    assert_eq!(cache.get_day_start_time().await, t("08:00"));
    assert_eq!(remote.fetch_count(), 0);

    handle.wait().await;
    Ok(())
}

#[tokio::test]
async fn failed_propagation_does_not_roll_back() -> Result<()> {
    let local = Arc::new(MemoryLocalStore::new());
    let remote = Arc::new(ScriptedRemote::failing());
    let cache = cache_with(&local, &remote);
    let mut events = cache.subscribe();

    let outcome = cache.update_day_start_time(t("06:30")).wait().await;
    assert!(matches!(outcome, PropagationOutcome::Failed(_)));
    assert_eq!(cache.get_day_start_time().await, t("06:30"));
    assert_eq!(local.get(SETTING_KEY)?.as_deref(), Some("06:30"));

    let event = events.recv().await?;
    assert!(matches!(
        event,
        SettingsEvent::PropagationFailed { value, .. } if value == t("06:30")
    ));
    Ok(())
}

#[tokio::test]
async fn successful_propagation_publishes_event() -> Result<()> {
    let local = Arc::new(MemoryLocalStore::new());
    let remote = Arc::new(ScriptedRemote::returning("05:00"));
    let cache = cache_with(&local, &remote);
    let mut events = cache.subscribe();

    cache.update_day_start_time(t("09:00")).wait().await;
    assert_eq!(
        events.recv().await?,
        SettingsEvent::Propagated { value: t("09:00") }
    );
    Ok(())
}

#[tokio::test]
async fn rapid_writes_propagate_latest_value_last() -> Result<()> {
    let local = Arc::new(MemoryLocalStore::new());
    let remote = Arc::new(ScriptedRemote::returning("05:00"));
    let cache = cache_with(&local, &remote);

    let first = cache.update_day_start_time(t("06:00"));
    let second = cache.update_day_start_time(t("07:00"));
    let second = second.wait().await;
    let first = first.wait().await;

    assert_eq!(second, PropagationOutcome::Propagated);
    assert!(matches!(
        first,
        PropagationOutcome::Propagated | PropagationOutcome::Superseded
    ));
    assert_eq!(remote.put_values().last(), Some(&t("07:00")));
    assert_eq!(cache.get_day_start_time().await, t("07:00"));
    Ok(())
}

#[tokio::test]
async fn aborted_prefetch_leaves_cache_untouched() -> Result<()> {
    let local = Arc::new(MemoryLocalStore::new());
    let remote = Arc::new(ScriptedRemote::returning("07:30").gated());
    let cache = cache_with(&local, &remote);
    let mut events = cache.subscribe();

    let pending = cache.prefetch();
    remote.fetch_started.notified().await;
    pending.abort();
    assert!(pending.await.unwrap_err().is_cancelled());

    assert_eq!(cache.peek(), None);
    assert_eq!(local.get(SETTING_KEY)?, None);
    assert_eq!(events.recv().await?, SettingsEvent::PrefetchAbandoned);
    Ok(())
}

#[tokio::test]
async fn completed_prefetch_publishes_nothing() -> Result<()> {
    let local = Arc::new(MemoryLocalStore::new());
    let remote = Arc::new(ScriptedRemote::returning("07:30"));
    let cache = cache_with(&local, &remote);
    let mut events = cache.subscribe();

    assert_eq!(cache.prefetch().await?.value, t("07:30"));
    assert!(events.try_recv().is_err());
    Ok(())
}
