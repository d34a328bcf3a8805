//! # spindash-core
//!
//! Session-aware telemetry core for a webhook-connected exercise bike.
//!
//! One remote sensor pushes speed, resistance, and heart-rate samples plus
//! session lifecycle events (power-on, start, end). This crate owns all of
//! the real state: an ordered per-channel telemetry log, a session boundary
//! tracker, the ingest rules that tie the two together, and the summary
//! statistics the dashboard polls. Transport and rendering live elsewhere.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use spindash_core::{
//!     IngestConfig, IngestCoordinator, MemoryStore, SensorEvent, StatsAggregator,
//! };
//!
//! let store = Arc::new(MemoryStore::new());
//! let ingest = IngestCoordinator::new(store.clone(), IngestConfig::default());
//! let stats = StatsAggregator::new(store);
//!
//! let event = SensorEvent::from_json(
//!     r#"{"event": "start_session", "t": 1700000000, "ip": "203.0.113.9"}"#,
//! ).unwrap();
//! let ack = ingest.submit(&event).unwrap();
//! assert_eq!(ack.reply(), "started session");
//!
//! let summary = stats.summary().unwrap();
//! println!("{}", serde_json::to_string(&summary).unwrap());
//! ```
//!
//! ## Architecture
//!
//! Webhook → [`IngestCoordinator`] → {[`SessionTracker`] transition,
//! [`TelemetryLog`] append} → on demand, [`StatsAggregator`] → dashboard.
//!
//! All four share one [`StateStore`] holding a single [`SessionState`]
//! document. Multi-field mutations go through the store's atomic `apply`,
//! so poll-driven readers never observe a half-applied session reset. There
//! is exactly one logical writer (the bike); readers never block it.

pub mod error;
pub mod event;
pub mod ingest;
pub mod session;
pub mod state;
pub mod stats;
pub mod store;

pub use error::{IngestError, StoreError};
pub use event::{SensorEvent, TelemetryPoint};
pub use ingest::{Ack, IngestConfig, IngestCoordinator};
pub use session::SessionTracker;
pub use state::{JsonStore, MemoryStore, SessionPhase, SessionState, StateStore};
pub use stats::{ChannelStats, SeriesView, SessionSummary, StatsAggregator, series, summarize};
pub use store::TelemetryLog;

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
