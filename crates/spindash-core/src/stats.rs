//! Summary statistics and chart series over the session state.
//!
//! Everything here is a pure function of one document snapshot — nothing is
//! cached, every call recomputes. The summary has three shapes: waiting
//! (nothing to show yet), live (head sample plus elapsed time), and final
//! (whole-session mean/max per channel). An ended session with zero samples
//! reports waiting, never final: there is nothing to average, and mean/max
//! over an empty range is a defect rather than a valid state.

use std::sync::Arc;

use serde::Serialize;

use crate::error::StoreError;
use crate::event::TelemetryPoint;
use crate::state::{SessionState, StateStore, unix_now};

// ---------------------------------------------------------------------------
// Summary shapes
// ---------------------------------------------------------------------------

/// Mean and maximum over one telemetry channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStats {
    pub mean: f64,
    pub max: f64,
}

impl ChannelStats {
    /// Stats over the given values; `None` when the iterator is empty.
    fn over(values: impl Iterator<Item = f64>) -> Option<Self> {
        let mut n = 0usize;
        let mut sum = 0.0;
        let mut max = f64::NEG_INFINITY;
        for v in values {
            n += 1;
            sum += v;
            max = max.max(v);
        }
        (n > 0).then(|| Self {
            mean: sum / n as f64,
            max,
        })
    }
}

/// The dashboard-facing session summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionSummary {
    /// No summarizable data yet. Also the shape for an ended session that
    /// never recorded a sample.
    Waiting,
    /// A session is running and has samples: the current head reading plus
    /// elapsed time since the start.
    Live {
        session_id: Option<String>,
        started_at: i64,
        elapsed_secs: i64,
        /// Timestamp of the head sample.
        last_update: i64,
        current: TelemetryPoint,
    },
    /// The session ended with samples recorded: whole-session statistics.
    Final {
        session_id: Option<String>,
        /// Absent when the end arrived without any start (power loss etc.).
        started_at: Option<i64>,
        ended_at: i64,
        /// `ended_at - started_at`; absent without a start mark.
        duration_secs: Option<i64>,
        /// Human-relative phrasing, e.g. "4 minutes ago".
        ended_ago: String,
        speed_mph: ChannelStats,
        /// Present only when at least one sample carried the channel.
        resistance: Option<ChannelStats>,
        heart_bpm: ChannelStats,
    },
}

/// Parallel per-channel sequences for charting, newest first (matching the
/// retained log order).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesView {
    pub timestamps: Vec<i64>,
    pub speed_mph: Vec<f64>,
    /// Omitted entirely when no sample carried the channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resistance: Option<Vec<Option<i64>>>,
    pub heart_bpm: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Pure computation
// ---------------------------------------------------------------------------

/// Compute the summary for a state snapshot at wall-clock `now`.
pub fn summarize(state: &SessionState, now: i64) -> SessionSummary {
    let points = state.points();

    if let Some(ended_at) = state.session_end {
        let (Some(speed_mph), Some(heart_bpm)) = (
            ChannelStats::over(points.iter().map(|p| p.speed_mph)),
            ChannelStats::over(points.iter().map(|p| p.heart_bpm)),
        ) else {
            return SessionSummary::Waiting;
        };
        let resistance =
            ChannelStats::over(points.iter().filter_map(|p| p.resistance.map(|r| r as f64)));

        return SessionSummary::Final {
            session_id: state.session_id.clone(),
            started_at: state.session_start,
            ended_at,
            duration_secs: state.session_start.map(|start| ended_at - start),
            ended_ago: ago(now - ended_at),
            speed_mph,
            resistance,
            heart_bpm,
        };
    }

    if let (Some(started_at), Some(current)) = (state.session_start, state.latest()) {
        return SessionSummary::Live {
            session_id: state.session_id.clone(),
            started_at,
            elapsed_secs: now - started_at,
            last_update: current.timestamp,
            current,
        };
    }

    SessionSummary::Waiting
}

/// Materialize the chart series from a state snapshot.
pub fn series(state: &SessionState) -> SeriesView {
    let resistance = state
        .resistance
        .iter()
        .any(Option::is_some)
        .then(|| state.resistance.iter().copied().collect());

    SeriesView {
        timestamps: state.timestamps.iter().copied().collect(),
        speed_mph: state.speed_mph.iter().copied().collect(),
        resistance,
        heart_bpm: state.heart_bpm.iter().copied().collect(),
    }
}

/// Human-relative phrasing for `secs` seconds in the past.
fn ago(secs: i64) -> String {
    let secs = secs.max(0);
    if secs < 5 {
        return "just now".to_string();
    }
    let (n, unit) = if secs < 60 {
        (secs, "second")
    } else if secs < 3600 {
        (secs / 60, "minute")
    } else if secs < 86400 {
        (secs / 3600, "hour")
    } else {
        (secs / 86400, "day")
    };
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Read-side view over the shared state store.
#[derive(Clone)]
pub struct StatsAggregator {
    store: Arc<dyn StateStore>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// The current summary, recomputed from one snapshot.
    pub fn summary(&self) -> Result<SessionSummary, StoreError> {
        Ok(summarize(&self.store.snapshot()?, unix_now()))
    }

    /// The chart series, from one snapshot.
    pub fn series(&self) -> Result<SeriesView, StoreError> {
        Ok(series(&self.store.snapshot()?))
    }

    /// True only while a session is active and `caller` equals the producer
    /// address captured at its start. The address is cleared at session end,
    /// so an ended session never authorizes — even for a matching caller.
    pub fn is_authorized_origin(&self, caller: &str) -> Result<bool, StoreError> {
        Ok(self.store.snapshot()?.producer_addr.as_deref() == Some(caller))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStore;

    fn point(t: i64, mph: f64, resistance: Option<i64>, bpm: f64) -> TelemetryPoint {
        TelemetryPoint {
            timestamp: t,
            speed_mph: mph,
            resistance,
            heart_bpm: bpm,
        }
    }

    fn state_with(points: &[TelemetryPoint]) -> SessionState {
        let mut s = SessionState::default();
        for p in points {
            s.push_head(p);
        }
        s
    }

    // -----------------------------------------------------------------------
    // Summary cases
    // -----------------------------------------------------------------------

    #[test]
    fn empty_state_is_waiting() {
        assert_eq!(summarize(&SessionState::default(), 0), SessionSummary::Waiting);
    }

    #[test]
    fn ended_with_zero_points_is_waiting_not_final() {
        let mut s = SessionState::default();
        s.session_start = Some(100);
        s.session_end = Some(200);
        assert_eq!(summarize(&s, 300), SessionSummary::Waiting);
    }

    #[test]
    fn live_reports_head_and_elapsed() {
        let mut s = state_with(&[
            point(100, 10.0, Some(2), 110.0),
            point(101, 12.0, Some(3), 115.0),
        ]);
        s.session_start = Some(100);
        s.session_id = Some("sid".to_string());

        match summarize(&s, 130) {
            SessionSummary::Live {
                session_id,
                started_at,
                elapsed_secs,
                last_update,
                current,
            } => {
                assert_eq!(session_id.as_deref(), Some("sid"));
                assert_eq!(started_at, 100);
                assert_eq!(elapsed_secs, 30);
                assert_eq!(last_update, 101);
                assert_eq!(current.speed_mph, 12.0);
            }
            other => panic!("expected live, got {other:?}"),
        }
    }

    #[test]
    fn final_mean_max_and_duration() {
        let mut s = state_with(&[
            point(100, 10.0, None, 100.0),
            point(101, 20.0, None, 140.0),
            point(102, 15.0, None, 120.0),
        ]);
        s.session_start = Some(100);
        s.session_end = Some(160);

        match summarize(&s, 160) {
            SessionSummary::Final {
                duration_secs,
                speed_mph,
                resistance,
                heart_bpm,
                ..
            } => {
                assert_eq!(duration_secs, Some(60));
                assert_eq!(speed_mph.mean, 15.0);
                assert_eq!(speed_mph.max, 20.0);
                assert_eq!(resistance, None);
                assert_eq!(heart_bpm.mean, 120.0);
                assert_eq!(heart_bpm.max, 140.0);
            }
            other => panic!("expected final, got {other:?}"),
        }
    }

    #[test]
    fn resistance_stats_cover_only_reporting_samples() {
        let mut s = state_with(&[
            point(100, 10.0, Some(2), 100.0),
            point(101, 10.0, None, 100.0),
            point(102, 10.0, Some(6), 100.0),
        ]);
        s.session_start = Some(100);
        s.session_end = Some(110);

        match summarize(&s, 120) {
            SessionSummary::Final { resistance, .. } => {
                let r = resistance.expect("channel present");
                assert_eq!(r.mean, 4.0);
                assert_eq!(r.max, 6.0);
            }
            other => panic!("expected final, got {other:?}"),
        }
    }

    #[test]
    fn final_without_start_has_no_duration() {
        let mut s = state_with(&[point(100, 10.0, None, 100.0)]);
        s.session_end = Some(105);

        match summarize(&s, 110) {
            SessionSummary::Final {
                started_at,
                duration_secs,
                ..
            } => {
                assert_eq!(started_at, None);
                assert_eq!(duration_secs, None);
            }
            other => panic!("expected final, got {other:?}"),
        }
    }

    #[test]
    fn points_before_any_start_still_wait() {
        let s = state_with(&[point(100, 10.0, None, 100.0)]);
        assert_eq!(summarize(&s, 110), SessionSummary::Waiting);
    }

    // -----------------------------------------------------------------------
    // Series view
    // -----------------------------------------------------------------------

    #[test]
    fn series_is_parallel_and_newest_first() {
        let s = state_with(&[
            point(100, 10.0, Some(2), 110.0),
            point(101, 12.0, Some(3), 112.0),
        ]);
        let v = series(&s);
        assert_eq!(v.timestamps, vec![101, 100]);
        assert_eq!(v.speed_mph, vec![12.0, 10.0]);
        assert_eq!(v.resistance, Some(vec![Some(3), Some(2)]));
        assert_eq!(v.heart_bpm, vec![112.0, 110.0]);
    }

    #[test]
    fn series_omits_resistance_when_never_reported() {
        let s = state_with(&[point(100, 10.0, None, 110.0)]);
        let v = series(&s);
        assert_eq!(v.resistance, None);
        let json = serde_json::to_value(&v).unwrap();
        assert!(json.get("resistance").is_none());
    }

    // -----------------------------------------------------------------------
    // Relative phrasing
    // -----------------------------------------------------------------------

    #[test]
    fn ago_phrasing() {
        assert_eq!(ago(0), "just now");
        assert_eq!(ago(30), "30 seconds ago");
        assert_eq!(ago(60), "1 minute ago");
        assert_eq!(ago(150), "2 minutes ago");
        assert_eq!(ago(7200), "2 hours ago");
        assert_eq!(ago(200_000), "2 days ago");
        // A racing clock can put "now" before the end mark; clamp to zero.
        assert_eq!(ago(-5), "just now");
    }

    // -----------------------------------------------------------------------
    // Authorization
    // -----------------------------------------------------------------------

    #[test]
    fn origin_authorization_follows_producer_address() {
        let store = Arc::new(MemoryStore::new());
        let stats = StatsAggregator::new(store.clone());

        assert!(!stats.is_authorized_origin("198.51.100.7").unwrap());

        store
            .apply(&mut |s| s.producer_addr = Some("198.51.100.7".to_string()))
            .unwrap();
        assert!(stats.is_authorized_origin("198.51.100.7").unwrap());
        assert!(!stats.is_authorized_origin("198.51.100.8").unwrap());

        // End clears the address; a matching caller no longer authorizes.
        store
            .apply(&mut |s| {
                s.session_end = Some(10);
                s.producer_addr = None;
            })
            .unwrap();
        assert!(!stats.is_authorized_origin("198.51.100.7").unwrap());
    }

    #[test]
    fn summary_reads_through_the_aggregator() {
        let store = Arc::new(MemoryStore::new());
        let stats = StatsAggregator::new(store.clone());
        assert_eq!(stats.summary().unwrap(), SessionSummary::Waiting);

        store
            .apply(&mut |s| {
                s.session_start = Some(1);
                s.push_head(&point(1, 8.0, None, 90.0));
            })
            .unwrap();
        assert!(matches!(
            stats.summary().unwrap(),
            SessionSummary::Live { .. }
        ));
    }
}
