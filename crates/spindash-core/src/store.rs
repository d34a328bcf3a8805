//! Ordered telemetry append log with bounded retention.
//!
//! Samples are kept newest-first, one entry per channel sequence in the
//! shared document. Append pushes the new head and trims past the cap in a
//! single atomic write; reads materialize the whole log, which sessions are
//! short enough to make acceptable.

use std::sync::Arc;

use crate::error::StoreError;
use crate::event::TelemetryPoint;
use crate::state::StateStore;

/// Append log over the shared state store.
#[derive(Clone)]
pub struct TelemetryLog {
    store: Arc<dyn StateStore>,
    max_points: usize,
}

impl TelemetryLog {
    /// `max_points` caps retention; zero means unbounded.
    pub fn new(store: Arc<dyn StateStore>, max_points: usize) -> Self {
        Self { store, max_points }
    }

    /// Retention cap (0 = unbounded).
    pub fn max_points(&self) -> usize {
        self.max_points
    }

    /// Drop every retained sample, leaving session marks alone.
    pub fn reset(&self) -> Result<(), StoreError> {
        self.store.apply(&mut |s| s.clear_points())
    }

    /// Push `point` as the new head and enforce the cap, as one write.
    pub fn append(&self, point: &TelemetryPoint) -> Result<(), StoreError> {
        let cap = self.max_points;
        self.store.apply(&mut |s| {
            s.push_head(point);
            s.trim_to(cap);
        })
    }

    /// The most recently accepted sample.
    pub fn latest(&self) -> Result<Option<TelemetryPoint>, StoreError> {
        Ok(self.store.snapshot()?.latest())
    }

    /// Timestamp of the current head.
    pub fn head_timestamp(&self) -> Result<Option<i64>, StoreError> {
        Ok(self.store.snapshot()?.head_timestamp())
    }

    /// Every retained sample, newest first.
    pub fn range(&self) -> Result<Vec<TelemetryPoint>, StoreError> {
        Ok(self.store.snapshot()?.points())
    }

    /// Number of retained samples.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.store.snapshot()?.len())
    }

    /// True when nothing is retained.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.store.snapshot()?.is_empty())
    }
}
