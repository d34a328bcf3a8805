//! Webhook ingest coordination.
//!
//! [`IngestCoordinator::submit`] is the single entrypoint for sensor events:
//! it validates the record, drives the session tracker, rejects stale data,
//! and commits accepted samples to the telemetry log. Every disposition is
//! emitted through the `log` facade so an external sink observes the full
//! event stream.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::IngestError;
use crate::event::SensorEvent;
use crate::session::SessionTracker;
use crate::state::StateStore;
use crate::store::TelemetryLog;

/// Tunables for the ingest path.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Samples retained per session; 0 = unbounded. Unbounded is the normal
    /// deployment: the bike ends sessions on its own before the log grows
    /// unreasonably.
    pub max_points: usize,
    /// Pause after an accepted `end_session` before acknowledging, widening
    /// the window so a racing summary poll sees the end mark. Coarse
    /// substitute for a read-your-writes barrier, not a correctness
    /// guarantee. Set to zero in tests.
    pub end_quiesce: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_points: 0,
            end_quiesce: Duration::from_millis(100),
        }
    }
}

/// Positive acknowledgement for a handled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    PowerOnRecorded,
    SessionStarted,
    SessionEnded,
    DataAppended,
    /// The sample was older than the current head, or arrived after the
    /// session ended. Acknowledged but not stored.
    IgnoredStale,
}

impl Ack {
    /// Reply string the webhook returns to the device.
    pub fn reply(&self) -> &'static str {
        match self {
            Ack::PowerOnRecorded => "power on received",
            Ack::SessionStarted => "started session",
            Ack::SessionEnded => "ended session",
            Ack::DataAppended => "data appended",
            Ack::IgnoredStale => "ignored stale data",
        }
    }
}

/// Owns the tracker and the log, and applies the per-event transition rules.
pub struct IngestCoordinator {
    store: Arc<dyn StateStore>,
    tracker: SessionTracker,
    log: TelemetryLog,
    end_quiesce: Duration,
}

impl IngestCoordinator {
    pub fn new(store: Arc<dyn StateStore>, config: IngestConfig) -> Self {
        Self {
            tracker: SessionTracker::new(Arc::clone(&store)),
            log: TelemetryLog::new(Arc::clone(&store), config.max_points),
            store,
            end_quiesce: config.end_quiesce,
        }
    }

    /// The session tracker sharing this coordinator's state store.
    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// The telemetry log sharing this coordinator's state store.
    pub fn log(&self) -> &TelemetryLog {
        &self.log
    }

    /// Apply one sensor event.
    ///
    /// Stale samples are an `Ok(Ack::IgnoredStale)`, not an error: the device
    /// treats them as delivered. Unknown kinds and malformed payloads reject
    /// without mutating anything; retry is the device's responsibility.
    pub fn submit(&self, event: &SensorEvent) -> Result<Ack, IngestError> {
        debug!("received '{}' event", event.kind());
        match event {
            SensorEvent::PoweredOn { t } => {
                self.tracker.power_on(*t)?;
                info!("bike powered on at t={t}");
                Ok(Ack::PowerOnRecorded)
            }

            SensorEvent::SessionStart { t, origin } => {
                let id = self.tracker.begin(*t, origin.as_deref())?;
                info!(
                    "started session {id} at t={t} (origin {})",
                    origin.as_deref().unwrap_or("unknown")
                );
                Ok(Ack::SessionStarted)
            }

            SensorEvent::SessionEnd { t } => {
                self.tracker.end(*t)?;
                if !self.end_quiesce.is_zero() {
                    std::thread::sleep(self.end_quiesce);
                }
                info!("ended session at t={t}");
                Ok(Ack::SessionEnded)
            }

            SensorEvent::NewData(point) => {
                // Stale means older than the current head, or after session
                // end. Ordering against entries behind the head is not
                // checked; consumers depend on exactly this comparison.
                let state = self.store.snapshot().map_err(IngestError::Storage)?;
                let behind_head = state
                    .head_timestamp()
                    .is_some_and(|head| head > point.timestamp);
                if behind_head || state.session_end.is_some() {
                    info!(
                        "ignored stale sample t={} (head {:?}, ended {})",
                        point.timestamp,
                        state.head_timestamp(),
                        state.session_end.is_some()
                    );
                    return Ok(Ack::IgnoredStale);
                }

                self.log.append(point)?;
                info!(
                    "appended sample t={} mph={:.2} bpm={:.1}",
                    point.timestamp, point.speed_mph, point.heart_bpm
                );
                Ok(Ack::DataAppended)
            }

            SensorEvent::Unknown { kind } => {
                warn!("rejected event kind '{kind}'");
                Err(IngestError::UnknownEventKind(kind.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TelemetryPoint;
    use crate::state::{MemoryStore, SessionState};

    fn coordinator(max_points: usize) -> IngestCoordinator {
        IngestCoordinator::new(
            Arc::new(MemoryStore::new()),
            IngestConfig {
                max_points,
                end_quiesce: Duration::ZERO,
            },
        )
    }

    fn data(t: i64, mph: f64) -> SensorEvent {
        SensorEvent::NewData(TelemetryPoint {
            timestamp: t,
            speed_mph: mph,
            resistance: Some(4),
            heart_bpm: 130.0,
        })
    }

    fn snapshot(c: &IngestCoordinator) -> SessionState {
        c.store.snapshot().unwrap()
    }

    // -----------------------------------------------------------------------
    // Per-kind transition rules
    // -----------------------------------------------------------------------

    #[test]
    fn powered_on_does_not_touch_a_running_session() {
        let c = coordinator(0);
        c.submit(&SensorEvent::SessionStart { t: 100, origin: None })
            .unwrap();
        c.submit(&data(101, 12.0)).unwrap();

        let ack = c.submit(&SensorEvent::PoweredOn { t: 102 }).unwrap();
        assert_eq!(ack, Ack::PowerOnRecorded);

        let s = snapshot(&c);
        assert_eq!(s.powered_on_at, Some(102));
        assert_eq!(s.session_start, Some(100));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn start_always_yields_empty_log_and_not_ended() {
        let c = coordinator(0);
        c.submit(&SensorEvent::SessionStart { t: 100, origin: None })
            .unwrap();
        c.submit(&data(101, 10.0)).unwrap();
        c.submit(&SensorEvent::SessionEnd { t: 102 }).unwrap();

        let ack = c
            .submit(&SensorEvent::SessionStart {
                t: 200,
                origin: Some("203.0.113.5".to_string()),
            })
            .unwrap();
        assert_eq!(ack, Ack::SessionStarted);

        let s = snapshot(&c);
        assert!(s.is_empty());
        assert_eq!(s.session_end, None);
        assert_eq!(s.session_start, Some(200));
        assert_eq!(s.producer_addr.as_deref(), Some("203.0.113.5"));
        assert!(s.session_id.is_some());
    }

    #[test]
    fn end_is_accepted_without_a_start() {
        let c = coordinator(0);
        let ack = c.submit(&SensorEvent::SessionEnd { t: 10 }).unwrap();
        assert_eq!(ack, Ack::SessionEnded);
        assert_eq!(snapshot(&c).session_end, Some(10));
    }

    #[test]
    fn double_end_is_idempotent() {
        let c = coordinator(0);
        c.submit(&SensorEvent::SessionStart { t: 100, origin: None })
            .unwrap();
        c.submit(&data(101, 10.0)).unwrap();

        c.submit(&SensorEvent::SessionEnd { t: 150 }).unwrap();
        let first = snapshot(&c);
        c.submit(&SensorEvent::SessionEnd { t: 150 }).unwrap();
        let second = snapshot(&c);

        assert_eq!(first, second);
    }

    // -----------------------------------------------------------------------
    // Staleness
    // -----------------------------------------------------------------------

    #[test]
    fn sample_behind_head_is_ignored_and_store_unchanged() {
        let c = coordinator(0);
        c.submit(&SensorEvent::SessionStart { t: 100, origin: None })
            .unwrap();
        c.submit(&data(105, 10.0)).unwrap();
        let before = snapshot(&c);

        let ack = c.submit(&data(104, 99.0)).unwrap();
        assert_eq!(ack, Ack::IgnoredStale);
        assert_eq!(snapshot(&c), before);
    }

    #[test]
    fn sample_after_end_is_ignored() {
        let c = coordinator(0);
        c.submit(&SensorEvent::SessionStart { t: 100, origin: None })
            .unwrap();
        c.submit(&SensorEvent::SessionEnd { t: 110 }).unwrap();

        let ack = c.submit(&data(111, 10.0)).unwrap();
        assert_eq!(ack, Ack::IgnoredStale);
        assert!(snapshot(&c).is_empty());
    }

    #[test]
    fn equal_timestamp_is_accepted_as_written() {
        let c = coordinator(0);
        c.submit(&data(100, 10.0)).unwrap();
        let ack = c.submit(&data(100, 11.0)).unwrap();
        assert_eq!(ack, Ack::DataAppended);
        assert_eq!(snapshot(&c).len(), 2);
    }

    #[test]
    fn staleness_compares_against_the_head_only() {
        let c = coordinator(0);
        c.submit(&data(100, 1.0)).unwrap();
        c.submit(&data(105, 2.0)).unwrap();
        // Behind the head: ignored. At the head: accepted.
        assert_eq!(c.submit(&data(103, 3.0)).unwrap(), Ack::IgnoredStale);
        assert_eq!(c.submit(&data(105, 4.0)).unwrap(), Ack::DataAppended);
    }

    #[test]
    fn trimming_applies_on_ingest() {
        let c = coordinator(3);
        c.submit(&SensorEvent::SessionStart { t: 99, origin: None })
            .unwrap();
        for t in 100..105 {
            c.submit(&data(t, t as f64)).unwrap();
        }
        let ts: Vec<i64> = snapshot(&c).timestamps.iter().copied().collect();
        assert_eq!(ts, vec![104, 103, 102]);
    }

    // -----------------------------------------------------------------------
    // Rejections
    // -----------------------------------------------------------------------

    #[test]
    fn unknown_kind_rejects_without_mutation() {
        let c = coordinator(0);
        c.submit(&data(100, 10.0)).unwrap();
        let before = snapshot(&c);

        let err = c
            .submit(&SensorEvent::Unknown {
                kind: "calibrate".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, IngestError::UnknownEventKind(k) if k == "calibrate"));
        assert_eq!(snapshot(&c), before);
    }

    #[test]
    fn coordinator_stays_usable_after_a_rejection() {
        let c = coordinator(0);
        let _ = c.submit(&SensorEvent::Unknown {
            kind: "nope".to_string(),
        });
        assert_eq!(c.submit(&data(1, 1.0)).unwrap(), Ack::DataAppended);
    }

    #[test]
    fn ack_replies_match_the_wire_contract() {
        assert_eq!(Ack::PowerOnRecorded.reply(), "power on received");
        assert_eq!(Ack::SessionStarted.reply(), "started session");
        assert_eq!(Ack::SessionEnded.reply(), "ended session");
        assert_eq!(Ack::DataAppended.reply(), "data appended");
        assert_eq!(Ack::IgnoredStale.reply(), "ignored stale data");
    }
}
