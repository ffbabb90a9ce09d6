#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use daybook::clock::FixedClock;
use daybook::day::{reference_offset, DayStartTime};
use daybook::session::{Identity, IdentitySource};
use daybook::settings::SettingsRemote;
use daybook::RemoteError;
use tokio::sync::Notify;

pub fn t(s: &str) -> DayStartTime {
    s.parse().expect("valid day start time")
}

/// UTC instant for a wall-clock time in the UTC+9 reference zone.
pub fn reference_local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    reference_offset()
        .with_ymd_and_hms(y, mo, d, h, mi, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(reference_local(2024, 6, 10, 12, 0)))
}

/// Remote settings store with scripted answers and an optional gate that
/// holds fetches until released.
pub struct ScriptedRemote {
    answer: Mutex<Result<Option<DayStartTime>, RemoteError>>,
    fail_puts: bool,
    gate: Option<Notify>,
    pub fetch_started: Notify,
    pub fetches: AtomicUsize,
    pub puts: Mutex<Vec<DayStartTime>>,
}

impl ScriptedRemote {
    fn with_answer(answer: Result<Option<DayStartTime>, RemoteError>) -> Self {
        Self {
            answer: Mutex::new(answer),
            fail_puts: false,
            gate: None,
            fetch_started: Notify::new(),
            fetches: AtomicUsize::new(0),
            puts: Mutex::new(Vec::new()),
        }
    }

    pub fn returning(value: &str) -> Self {
        Self::with_answer(Ok(Some(t(value))))
    }

    pub fn empty() -> Self {
        Self::with_answer(Ok(None))
    }

    pub fn failing() -> Self {
        let mut remote =
            Self::with_answer(Err(RemoteError::Transport("connection refused".into())));
        remote.fail_puts = true;
        remote
    }

    /// Hold every fetch until [`release`](Self::release) is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Notify::new());
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn set_answer(&self, answer: Result<Option<DayStartTime>, RemoteError>) {
        *self.answer.lock().unwrap() = answer;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn put_values(&self) -> Vec<DayStartTime> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SettingsRemote for ScriptedRemote {
    async fn fetch_day_start_time(&self) -> Result<Option<DayStartTime>, RemoteError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.fetch_started.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.answer.lock().unwrap().clone()
    }

    async fn put_day_start_time(&self, value: DayStartTime) -> Result<(), RemoteError> {
        if self.fail_puts {
            return Err(RemoteError::Status { status: 502 });
        }
        self.puts.lock().unwrap().push(value);
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub struct ScriptedIdentity {
    answer: Mutex<Result<Option<Identity>, RemoteError>>,
    hangs: bool,
    pub calls: AtomicUsize,
}

impl ScriptedIdentity {
    fn with_answer(answer: Result<Option<Identity>, RemoteError>) -> Self {
        Self {
            answer: Mutex::new(answer),
            hangs: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn signed_in(id: &str) -> Self {
        Self::with_answer(Ok(Some(Identity {
            id: id.to_string(),
            email: Some(format!("{id}@example.com")),
            name: None,
        })))
    }

    pub fn failing() -> Self {
        Self::with_answer(Err(RemoteError::Status { status: 500 }))
    }

    /// An identity endpoint that accepts the request and never answers.
    pub fn unresponsive() -> Self {
        let mut source = Self::signed_in("never");
        source.hangs = true;
        source
    }

    pub fn set_answer(&self, answer: Result<Option<Identity>, RemoteError>) {
        *self.answer.lock().unwrap() = answer;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentitySource for ScriptedIdentity {
    async fn fetch_identity(&self) -> Result<Option<Identity>, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hangs {
            std::future::pending::<()>().await;
        }
        self.answer.lock().unwrap().clone()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
