//! In-memory record source.
//!
//! Used by tests and by embedders that keep records in process. Supports
//! failure injection, load counting and simulating an environment where
//! change watching is unavailable.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use tally_core::{Record, SourceError, WatchError};
use tokio::sync::broadcast;

use crate::source::{
    ChangeEvent, ChangeOrigin, ChangeStream, RecordSource, RecordStore, CHANGE_CHANNEL_CAPACITY,
};

#[derive(Debug)]
pub struct InMemoryRecordSource {
    records: RwLock<Vec<Record>>,
    failure: Mutex<Option<SourceError>>,
    watch_supported: AtomicBool,
    loads: AtomicU64,
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for InMemoryRecordSource {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl InMemoryRecordSource {
    pub fn new(records: Vec<Record>) -> Self {
        let (tx, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            records: RwLock::new(records),
            failure: Mutex::new(None),
            watch_supported: AtomicBool::new(true),
            loads: AtomicU64::new(0),
            tx,
        }
    }

    /// A source whose change subscription always fails.
    pub fn without_watch(records: Vec<Record>) -> Self {
        let source = Self::new(records);
        source.watch_supported.store(false, Ordering::SeqCst);
        source
    }

    /// Number of `load_all` calls so far, failed ones included.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    /// Make every subsequent load fail with `err`.
    pub fn fail_with(&self, err: SourceError) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(err);
    }

    pub fn clear_failure(&self) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Replace the records as an external writer would and emit one raw
    /// change event.
    pub fn set_records(&self, records: Vec<Record>) {
        *self.records.write().unwrap_or_else(|e| e.into_inner()) = records;
        self.emit(ChangeOrigin::Watcher);
    }

    /// Emit a raw change event without touching the records.
    pub fn emit(&self, origin: ChangeOrigin) {
        // No subscribers is fine.
        let _ = self.tx.send(ChangeEvent::new(origin));
    }

    fn snapshot(&self) -> Result<Vec<Record>, SourceError> {
        if let Some(err) = self
            .failure
            .lock()
            .map_err(|_| SourceError::unavailable("failure lock poisoned"))?
            .clone()
        {
            return Err(err);
        }
        self.records
            .read()
            .map(|records| records.clone())
            .map_err(|_| SourceError::unavailable("record lock poisoned"))
    }
}

#[async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn load_all(&self) -> Result<Vec<Record>, SourceError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.snapshot()
    }

    fn watch_supported(&self) -> bool {
        self.watch_supported.load(Ordering::SeqCst)
    }

    fn subscribe_to_changes(&self) -> Result<ChangeStream, WatchError> {
        if !self.watch_supported() {
            return Err(WatchError::unsupported("in-memory source has watching disabled"));
        }
        Ok(self.tx.subscribe())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordSource {
    async fn load_for_write(&self) -> Result<Vec<Record>, SourceError> {
        self.snapshot()
    }

    async fn replace_all(&self, records: Vec<Record>) -> Result<(), SourceError> {
        {
            let mut guard = self
                .records
                .write()
                .map_err(|_| SourceError::unavailable("record lock poisoned"))?;
            *guard = records;
        }
        self.emit(ChangeOrigin::LocalWrite);
        Ok(())
    }
}
