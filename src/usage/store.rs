//! Usage Store
//!
//! Durable append-only usage log (`usage.jsonl`) plus the in-memory working
//! view used for rate calculations.
//!
//! Usage tracking is best-effort: read failures are treated as a cold start
//! and write failures are logged and swallowed in [`UsageStore::append`].

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Lines, Write};
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::event::UsageEvent;
use super::session::{SessionState, DEFAULT_SESSION_TIMEOUT_SECS};
use super::summary::UsageSummary;
use crate::error::{describe_chain, PersistenceError};

pub const USAGE_LOG_FILE: &str = "usage.jsonl";
pub const SESSION_FILE: &str = "current_session.json";
pub const QUOTA_STATE_FILE: &str = "quota_state.json";
pub const LOCK_FILE: &str = "usage.lock";

/// Default retention of the working view, in hours
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// Daily counters roll over this long after the previous reset
pub const DAILY_RESET_HOURS: i64 = 24;

/// Tunables for the usage store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageSettings {
    /// How far back the working view reaches
    pub retention: Duration,

    /// Gap after which a new session starts
    pub session_timeout: Duration,
}

impl Default for UsageSettings {
    fn default() -> Self {
        Self {
            retention: Duration::hours(DEFAULT_RETENTION_HOURS),
            session_timeout: Duration::seconds(DEFAULT_SESSION_TIMEOUT_SECS),
        }
    }
}

/// Copy of the working view at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSnapshot {
    /// Retained events in arrival order
    pub events: Vec<UsageEvent>,

    /// Start of the current daily window
    pub last_reset: DateTime<Utc>,
}

/// What a prune pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Events dropped from the working view
    pub pruned: usize,

    /// Whether the daily window rolled over
    pub daily_reset: bool,
}

/// Contents of `quota_state.json`
#[derive(Debug, Serialize, Deserialize)]
struct QuotaState {
    last_reset: DateTime<Utc>,
}

#[derive(Debug)]
struct WorkingView {
    events: Vec<UsageEvent>,
    last_reset: DateTime<Utc>,
}

/// File-backed usage store rooted at a base directory
#[derive(Debug)]
pub struct UsageStore {
    dir: PathBuf,
    settings: UsageSettings,
    view: Mutex<WorkingView>,
}

impl UsageStore {
    /// Open the store with default settings
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self::open_with(dir, UsageSettings::default())
    }

    /// Open the store with custom settings
    pub fn open_with(dir: impl Into<PathBuf>, settings: UsageSettings) -> Self {
        Self::open_at(dir, settings, Utc::now())
    }

    /// Open the store as of `now`
    ///
    /// Loads the events inside the retention window and the daily reset
    /// time. Missing or unreadable state is a cold start.
    pub fn open_at(dir: impl Into<PathBuf>, settings: UsageSettings, now: DateTime<Utc>) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!("Failed to create usage directory {:?}: {}", dir, e);
        }

        let events: Vec<UsageEvent> =
            read_log(&dir.join(USAGE_LOG_FILE), window_start(now, settings.retention))
                .collect();
        let stored = read_json::<QuotaState>(&dir.join(QUOTA_STATE_FILE));

        let store = Self {
            dir,
            settings,
            view: Mutex::new(WorkingView {
                last_reset: stored
                    .as_ref()
                    .map(|s| s.last_reset)
                    .or_else(|| events.first().map(|e| e.timestamp))
                    .unwrap_or(now),
                events,
            }),
        };

        if stored.is_none() {
            let last_reset = store.view().last_reset;
            if let Err(e) = store.write_quota_state(last_reset) {
                warn!("Failed to record daily window: {}", describe_chain(&e));
            }
        }

        store.prune_older_than_at(settings.retention, now);
        debug!(
            "Opened usage store at {:?} ({} events in working view)",
            store.dir,
            store.view().events.len()
        );
        store
    }

    /// Base directory of the store
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings(&self) -> UsageSettings {
        self.settings
    }

    /// Path of the durable usage log
    pub fn log_path(&self) -> PathBuf {
        self.dir.join(USAGE_LOG_FILE)
    }

    fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    fn view(&self) -> MutexGuard<'_, WorkingView> {
        self.view.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record one event
    ///
    /// Never fails: persistence errors are logged and the event still counts
    /// toward the in-memory working view. Returns the updated session when
    /// it could be written.
    pub fn append(&self, event: UsageEvent) -> Option<SessionState> {
        match self.try_append(event) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Failed to record usage, continuing: {}", describe_chain(&e));
                None
            }
        }
    }

    /// Record one event, surfacing persistence errors
    ///
    /// Appends are serialized across processes by an exclusive lock on
    /// `usage.lock`. An event older than the last recorded activity is
    /// clamped forward so the log stays ordered.
    pub fn try_append(&self, mut event: UsageEvent) -> Result<SessionState, PersistenceError> {
        let _lock = match self.lock_log() {
            Ok(lock) => lock,
            Err(e) => {
                self.view().events.push(event);
                return Err(e);
            }
        };

        let previous = read_json::<SessionState>(&self.session_path());
        if let Some(prev) = &previous {
            if event.timestamp < prev.last_activity {
                event.timestamp = prev.last_activity;
            }
        }

        let session = SessionState::advance(previous.clone(), &event, self.settings.session_timeout);
        event.session_id = Some(session.session_id.clone());
        self.view().events.push(event.clone());

        // Session first: a failed log append rolls it back, so the session
        // never counts an event the log does not hold.
        write_json_atomic(&self.session_path(), &session, "session state")?;
        if let Err(e) = self.append_line(&event) {
            self.restore_session(previous.as_ref());
            return Err(e);
        }
        Ok(session)
    }

    fn restore_session(&self, previous: Option<&SessionState>) {
        let path = self.session_path();
        let restored = match previous {
            Some(prev) => write_json_atomic(&path, prev, "session state"),
            None => match fs::remove_file(&path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    Err(PersistenceError::io(&path, e))
                }
                _ => Ok(()),
            },
        };
        if let Err(e) = restored {
            warn!("Failed to roll back session state: {}", describe_chain(&e));
        }
    }

    fn lock_log(&self) -> Result<LogLock, PersistenceError> {
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| PersistenceError::io(&path, e))?;
        file.lock().map_err(|e| PersistenceError::io(&path, e))?;
        Ok(LogLock { file })
    }

    fn append_line(&self, event: &UsageEvent) -> Result<(), PersistenceError> {
        let path = self.log_path();
        let mut line = serde_json::to_string(event).map_err(|source| {
            PersistenceError::Serialize {
                what: "usage event",
                source,
            }
        })?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PersistenceError::io(&path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| PersistenceError::io(&path, e))
    }

    fn write_quota_state(&self, last_reset: DateTime<Utc>) -> Result<(), PersistenceError> {
        write_json_atomic(
            &self.dir.join(QUOTA_STATE_FILE),
            &QuotaState { last_reset },
            "quota state",
        )
    }

    /// Events with `timestamp >= now - window`, in arrival order
    ///
    /// Each call starts a fresh read-only scan of the log.
    pub fn recent_events(&self, window: Duration) -> RecentEvents {
        self.recent_events_at(window, Utc::now())
    }

    pub fn recent_events_at(&self, window: Duration, now: DateTime<Utc>) -> RecentEvents {
        read_log(&self.log_path(), window_start(now, window))
    }

    /// Prune the working view using the configured retention
    pub fn prune(&self) -> PruneReport {
        self.prune_older_than(self.settings.retention)
    }

    /// Drop events older than `retention` from the working view
    ///
    /// The durable log is left untouched. Also rolls the daily window over
    /// once 24 hours have passed since the previous reset.
    pub fn prune_older_than(&self, retention: Duration) -> PruneReport {
        self.prune_older_than_at(retention, Utc::now())
    }

    pub fn prune_older_than_at(&self, retention: Duration, now: DateTime<Utc>) -> PruneReport {
        let cutoff = window_start(now, retention);
        let mut view = self.view();

        let before = view.events.len();
        view.events.retain(|e| e.timestamp >= cutoff);
        let pruned = before - view.events.len();

        let daily_reset = now - view.last_reset >= Duration::hours(DAILY_RESET_HOURS);
        if daily_reset {
            view.last_reset = now;
        }
        drop(view);

        if daily_reset {
            debug!("Daily usage window reset at {}", now);
            if let Err(e) = self.write_quota_state(now) {
                warn!("Failed to record daily reset: {}", describe_chain(&e));
            }
        }

        PruneReport {
            pruned,
            daily_reset,
        }
    }

    /// Aggregate the log over the last `period`
    pub fn summarize(&self, period: Duration) -> UsageSummary {
        self.summarize_at(period, Utc::now())
    }

    pub fn summarize_at(&self, period: Duration, now: DateTime<Utc>) -> UsageSummary {
        UsageSummary::collect(self.recent_events_at(period, now), period)
    }

    /// The most recent `count` failed events that carry an error message
    pub fn recent_errors(&self, count: usize) -> Vec<UsageEvent> {
        if count == 0 {
            return Vec::new();
        }

        let mut errors = VecDeque::with_capacity(count);
        for event in read_log(&self.log_path(), DateTime::<Utc>::MIN_UTC) {
            if event.success || event.error.is_none() {
                continue;
            }
            if errors.len() == count {
                errors.pop_front();
            }
            errors.push_back(event);
        }
        errors.into()
    }

    /// Contents of `current_session.json`, if any
    pub fn current_session(&self) -> Option<SessionState> {
        read_json(&self.session_path())
    }

    /// Copy of the working view
    pub fn snapshot(&self) -> UsageSnapshot {
        let view = self.view();
        UsageSnapshot {
            events: view.events.clone(),
            last_reset: view.last_reset,
        }
    }

    /// Start of the current daily window
    pub fn last_reset(&self) -> DateTime<Utc> {
        self.view().last_reset
    }
}

/// Exclusive advisory lock held for the duration of one append
struct LogLock {
    file: File,
}

impl Drop for LogLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            debug!("Failed to release usage lock: {}", e);
        }
    }
}

/// Lazy scan over `usage.jsonl`
///
/// Yields events at or after the cutoff. Blank and malformed lines are
/// skipped; a read error ends the scan.
#[derive(Debug)]
pub struct RecentEvents {
    lines: Option<Lines<BufReader<File>>>,
    cutoff: DateTime<Utc>,
}

impl Iterator for RecentEvents {
    type Item = UsageEvent;

    fn next(&mut self) -> Option<UsageEvent> {
        let cutoff = self.cutoff;
        let lines = self.lines.as_mut()?;

        let next = loop {
            match lines.next() {
                None => break None,
                Some(Err(e)) => {
                    debug!("Stopping usage log scan: {}", e);
                    break None;
                }
                Some(Ok(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<UsageEvent>(line) {
                        Ok(event) if event.timestamp >= cutoff => break Some(event),
                        Ok(_) => continue,
                        Err(e) => debug!("Skipping malformed usage line: {}", e),
                    }
                }
            }
        };

        if next.is_none() {
            self.lines = None;
        }
        next
    }
}

impl FusedIterator for RecentEvents {}

/// `now - window`, saturating at the earliest representable time
fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn read_log(path: &Path, cutoff: DateTime<Utc>) -> RecentEvents {
    let lines = match File::open(path) {
        Ok(file) => Some(BufReader::new(file).lines()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            debug!("Usage log {:?} unreadable, treating as empty: {}", path, e);
            None
        }
    };
    RecentEvents { lines, cutoff }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            debug!("Failed to read {:?}: {}", path, e);
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Ignoring malformed {:?}: {}", path, e);
            None
        }
    }
}

/// Write `value` as pretty JSON via a temp file and rename
fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
    what: &'static str,
) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|source| PersistenceError::Serialize { what, source })?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| PersistenceError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| PersistenceError::io(path, e))
}
