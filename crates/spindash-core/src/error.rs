//! Error taxonomy for ingest and storage.
//!
//! Stale samples are not errors: the coordinator acknowledges them as ignored
//! (see [`crate::ingest::Ack::IgnoredStale`]) and leaves state untouched, so
//! the producing device never sees them as failures.

use thiserror::Error;

/// Failure reaching or updating the shared state store.
///
/// An `apply` that returns this has either committed nothing or rolled back
/// to the prior document; callers never observe a half-applied write.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A writer panicked while holding the state lock.
    #[error("state store lock poisoned")]
    Poisoned,

    /// The durable state file could not be read or written.
    #[error("state file i/o: {0}")]
    Io(#[from] std::io::Error),

    /// The state document could not be encoded or decoded.
    #[error("state document encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Rejection classes for a submitted webhook event.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A required field is missing or mistyped. Nothing was mutated.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The `event` discriminator is not one we understand. Nothing was mutated.
    #[error("event '{0}' not understood")]
    UnknownEventKind(String),

    /// The underlying state store could not be reached or updated.
    #[error(transparent)]
    Storage(#[from] StoreError),
}
