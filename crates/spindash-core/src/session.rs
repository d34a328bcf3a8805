//! Session lifecycle tracking.
//!
//! The tracker is a thin state machine over the shared document:
//! `NoSession → PoweredOn → Active → Ended`. A start reaches `Active` from
//! any state and discards prior data; `Ended` is always supersedable by the
//! next start, so there is no terminal state. Re-ending an ended session is
//! a no-op beyond overwriting the end timestamp.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::StoreError;
use crate::state::{SessionPhase, StateStore, unix_now};

/// Tracks session boundaries in the shared state store.
#[derive(Clone)]
pub struct SessionTracker {
    store: Arc<dyn StateStore>,
}

impl SessionTracker {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Record the controller power-on time. No effect on a running session.
    pub fn power_on(&self, t: i64) -> Result<(), StoreError> {
        self.store.apply(&mut |s| s.powered_on_at = Some(t))
    }

    /// Begin a new session at `t`, discarding everything from the previous
    /// one. The full reset, the start mark, the minted session id, and the
    /// producer address land as one atomic write. Returns the new id.
    pub fn begin(&self, t: i64, origin: Option<&str>) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.store.apply(&mut |s| {
            s.reset();
            s.session_start = Some(t);
            s.session_id = Some(id.clone());
            s.producer_addr = origin.map(str::to_owned);
        })?;
        Ok(id)
    }

    /// Mark the session ended at `t`. Clearing the producer address in the
    /// same write ends resistance-control eligibility immediately.
    pub fn end(&self, t: i64) -> Result<(), StoreError> {
        self.store.apply(&mut |s| {
            s.session_end = Some(t);
            s.producer_addr = None;
        })
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Result<SessionPhase, StoreError> {
        Ok(self.store.snapshot()?.phase())
    }

    /// True once a start mark exists.
    pub fn has_started(&self) -> Result<bool, StoreError> {
        Ok(self.store.snapshot()?.session_start.is_some())
    }

    /// True once an end mark exists.
    pub fn has_ended(&self) -> Result<bool, StoreError> {
        Ok(self.store.snapshot()?.session_end.is_some())
    }

    /// Seconds from the session start to its end, or to now while it is
    /// still running. `None` before any start.
    pub fn duration_so_far(&self) -> Result<Option<i64>, StoreError> {
        let snap = self.store.snapshot()?;
        let Some(start) = snap.session_start else {
            return Ok(None);
        };
        let until = snap.session_end.unwrap_or_else(unix_now);
        Ok(Some(until - start))
    }

    /// Producer origin address while the session is active.
    pub fn origin_address(&self) -> Result<Option<String>, StoreError> {
        Ok(self.store.snapshot()?.producer_addr)
    }
}
