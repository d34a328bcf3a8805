//! The shared session state document and the atomic store behind it.
//!
//! Store, tracker, and aggregator all read and write one keyed document:
//! the session boundary marks plus four parallel telemetry sequences, kept
//! newest-first. Every multi-field mutation (session reset, append+trim,
//! end+address-clear) goes through [`StateStore::apply`] as a single atomic
//! unit, so a concurrent reader never observes a half-applied reset or a
//! series update without its paired fields.
//!
//! Two stores are provided:
//! - [`MemoryStore`] — `Mutex`-guarded document, no durability.
//! - [`JsonStore`] — the same document persisted to a JSON file with a
//!   write-temp-then-rename commit; a failed commit rolls the in-memory
//!   copy back before the error is surfaced.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::event::TelemetryPoint;

/// Current wall-clock time as unix seconds.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

// ---------------------------------------------------------------------------
// Session state document
// ---------------------------------------------------------------------------

/// Lifecycle phase derived from the boundary marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Nothing recorded yet.
    NoSession,
    /// The bike controller reported power-on, but no session has started.
    PoweredOn,
    /// A session is running.
    Active,
    /// The last session has ended. Always supersedable by the next start.
    Ended,
}

/// The whole state for the current session: boundary marks plus the four
/// parallel telemetry sequences, newest-first.
///
/// The parallel layout mirrors the per-channel lists the dashboard charts
/// consume; [`push_head`](Self::push_head) and [`trim_to`](Self::trim_to)
/// keep the four sequences the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// When the bike controller last reported power-on. Informational.
    pub powered_on_at: Option<i64>,
    /// When the current session started. Absent before any session.
    pub session_start: Option<i64>,
    /// When the session ended. Absent while active; cleared only by the
    /// next session start.
    pub session_end: Option<i64>,
    /// Producer origin address captured at session start, cleared at end.
    /// Grants resistance-control authorization while present.
    pub producer_addr: Option<String>,
    /// Identifier minted at session start, for log and summary labelling.
    pub session_id: Option<String>,
    /// Sample times, newest first.
    pub timestamps: VecDeque<i64>,
    /// Speed channel, parallel to `timestamps`.
    pub speed_mph: VecDeque<f64>,
    /// Resistance channel, parallel to `timestamps`. Per-sample absence is
    /// preserved for device variants without the sensor.
    pub resistance: VecDeque<Option<i64>>,
    /// Heart-rate channel, parallel to `timestamps`.
    pub heart_bpm: VecDeque<f64>,
}

impl SessionState {
    /// Derive the lifecycle phase. An end mark wins over a start mark;
    /// a bare power-on mark is not a session.
    pub fn phase(&self) -> SessionPhase {
        if self.session_end.is_some() {
            SessionPhase::Ended
        } else if self.session_start.is_some() {
            SessionPhase::Active
        } else if self.powered_on_at.is_some() {
            SessionPhase::PoweredOn
        } else {
            SessionPhase::NoSession
        }
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// True when no samples are retained.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Timestamp of the most recently accepted sample.
    pub fn head_timestamp(&self) -> Option<i64> {
        self.timestamps.front().copied()
    }

    /// The most recently accepted sample.
    pub fn latest(&self) -> Option<TelemetryPoint> {
        self.point_at(0)
    }

    /// Materialize every retained sample, newest first.
    pub fn points(&self) -> Vec<TelemetryPoint> {
        (0..self.len()).filter_map(|i| self.point_at(i)).collect()
    }

    fn point_at(&self, i: usize) -> Option<TelemetryPoint> {
        Some(TelemetryPoint {
            timestamp: *self.timestamps.get(i)?,
            speed_mph: *self.speed_mph.get(i)?,
            resistance: *self.resistance.get(i)?,
            heart_bpm: *self.heart_bpm.get(i)?,
        })
    }

    /// Push a sample as the new head of all four sequences.
    pub fn push_head(&mut self, point: &TelemetryPoint) {
        self.timestamps.push_front(point.timestamp);
        self.speed_mph.push_front(point.speed_mph);
        self.resistance.push_front(point.resistance);
        self.heart_bpm.push_front(point.heart_bpm);
    }

    /// Drop the oldest samples past `cap`. A cap of zero means unbounded
    /// (sessions are expected to end before the log grows unreasonably).
    pub fn trim_to(&mut self, cap: usize) {
        if cap == 0 {
            return;
        }
        self.timestamps.truncate(cap);
        self.speed_mph.truncate(cap);
        self.resistance.truncate(cap);
        self.heart_bpm.truncate(cap);
    }

    /// Clear the four telemetry sequences, leaving the boundary marks alone.
    pub fn clear_points(&mut self) {
        self.timestamps.clear();
        self.speed_mph.clear();
        self.resistance.clear();
        self.heart_bpm.clear();
    }

    /// Discard everything. Used when a new session starts.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// Atomic state store
// ---------------------------------------------------------------------------

/// Shared keyed store for the session state document.
///
/// One `apply` call is one atomic unit: the mutation closure runs against the
/// document under exclusive access, and either every field write it makes
/// becomes visible together or (on storage failure) none of them do. Readers
/// take whole-document [`snapshot`](Self::snapshot)s and never block writers.
pub trait StateStore: Send + Sync {
    /// Run `mutate` against the document as a single atomic write.
    fn apply(&self, mutate: &mut dyn FnMut(&mut SessionState)) -> Result<(), StoreError>;

    /// A consistent copy of the whole document.
    fn snapshot(&self) -> Result<SessionState, StoreError>;
}

/// In-memory state store. The mutex is the atomic-unit boundary.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<SessionState>,
}

impl MemoryStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn apply(&self, mutate: &mut dyn FnMut(&mut SessionState)) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        mutate(&mut state);
        Ok(())
    }

    fn snapshot(&self) -> Result<SessionState, StoreError> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(state.clone())
    }
}

/// Durable state store backed by a single JSON document on disk.
///
/// Commits write the full document to a sibling temp file and rename it over
/// the target, so the file on disk is always one complete document. When the
/// commit fails the in-memory copy is rolled back before the error returns,
/// keeping memory and disk in agreement.
pub struct JsonStore {
    path: PathBuf,
    state: Mutex<SessionState>,
}

impl JsonStore {
    /// Open the store at `path`, loading the existing document if present.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str(&text)?
        } else {
            SessionState::default()
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &SessionState) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StateStore for JsonStore {
    fn apply(&self, mutate: &mut dyn FnMut(&mut SessionState)) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        let prior = state.clone();
        mutate(&mut state);
        if let Err(e) = self.persist(&state) {
            *state = prior;
            return Err(e);
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<SessionState, StoreError> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(state.clone())
    }
}
