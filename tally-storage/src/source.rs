//! Record source contract.
//!
//! The cache only ever reads through [`RecordSource`]. Writers (the record
//! CRUD endpoints) go through [`RecordStore`], which extends it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tally_core::{Record, SourceError, WatchError};
use tokio::sync::broadcast;

/// Capacity of the raw change-event channel.
///
/// Receivers that fall behind see `Lagged`, which the notifier treats as a
/// single change.
pub const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// What produced a raw change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Observed by watching the backing store.
    Watcher,
    /// Emitted by this process after a successful write.
    LocalWrite,
}

/// A raw, un-debounced change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub origin: ChangeOrigin,
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(origin: ChangeOrigin) -> Self {
        Self {
            origin,
            observed_at: Utc::now(),
        }
    }
}

/// Stream of raw change events.
pub type ChangeStream = broadcast::Receiver<ChangeEvent>;

/// Read side of the record store.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Load the full record collection.
    ///
    /// Fails with [`SourceError::Unavailable`] when the backing store cannot
    /// be read and [`SourceError::Malformed`] when its content is not a
    /// record collection.
    async fn load_all(&self) -> Result<Vec<Record>, SourceError>;

    /// Whether change watching can be established in this environment.
    fn watch_supported(&self) -> bool;

    /// Subscribe to raw change events.
    ///
    /// Best effort: callers must keep working when this returns
    /// [`WatchError::Unsupported`].
    fn subscribe_to_changes(&self) -> Result<ChangeStream, WatchError>;
}

/// Write side of the record store.
#[async_trait]
pub trait RecordStore: RecordSource {
    /// Load for a read-modify-write cycle. A missing backing store reads as
    /// an empty collection.
    async fn load_for_write(&self) -> Result<Vec<Record>, SourceError>;

    /// Replace the full record collection.
    async fn replace_all(&self, records: Vec<Record>) -> Result<(), SourceError>;
}
