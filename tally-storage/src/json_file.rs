//! JSON file record source.
//!
//! Records live in a single file holding a pretty-printed JSON array.
//! Change detection polls the file's modification time and length; writes
//! made through this source also publish an event directly.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tally_core::{Record, SourceError, WatchError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::source::{
    ChangeEvent, ChangeOrigin, ChangeStream, RecordSource, RecordStore, CHANGE_CHANNEL_CAPACITY,
};

/// Default interval between metadata polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Modification time and length of the backing file.
type Fingerprint = Option<(Option<SystemTime>, u64)>;

pub struct JsonFileRecordSource {
    path: PathBuf,
    poll_interval: Duration,
    tx: broadcast::Sender<ChangeEvent>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl JsonFileRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (tx, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            tx,
            poller: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory that must be readable for watching to work.
    fn watch_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn check_watchable(&self) -> Result<(), WatchError> {
        let dir = self.watch_dir();
        match std::fs::metadata(dir) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(WatchError::unsupported(format!(
                "{} is not a directory",
                dir.display()
            ))),
            Err(e) => Err(WatchError::unsupported(format!(
                "cannot watch {}: {}",
                dir.display(),
                e
            ))),
        }
    }

    async fn read_raw(&self) -> Result<String, std::io::Error> {
        tokio::fs::read_to_string(&self.path).await
    }

    fn parse(&self, raw: &str) -> Result<Vec<Record>, SourceError> {
        serde_json::from_str(raw).map_err(|e| {
            SourceError::malformed(format!("failed to parse {}: {}", self.path.display(), e))
        })
    }

    fn unavailable(&self, err: std::io::Error) -> SourceError {
        SourceError::unavailable(format!("failed to read {}: {}", self.path.display(), err))
    }
}

impl Drop for JsonFileRecordSource {
    fn drop(&mut self) {
        if let Ok(mut poller) = self.poller.lock() {
            if let Some(handle) = poller.take() {
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl RecordSource for JsonFileRecordSource {
    async fn load_all(&self) -> Result<Vec<Record>, SourceError> {
        let raw = self.read_raw().await.map_err(|e| self.unavailable(e))?;
        self.parse(&raw)
    }

    fn watch_supported(&self) -> bool {
        self.check_watchable().is_ok()
    }

    fn subscribe_to_changes(&self) -> Result<ChangeStream, WatchError> {
        self.check_watchable()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WatchError::unsupported(format!("no async runtime: {}", e)))?;

        let rx = self.tx.subscribe();
        let mut poller = self
            .poller
            .lock()
            .map_err(|_| WatchError::unsupported("poller lock poisoned"))?;
        let running = poller.as_ref().is_some_and(|handle| !handle.is_finished());
        if !running {
            info!(
                path = %self.path.display(),
                interval_ms = self.poll_interval.as_millis() as u64,
                "Starting record file watcher"
            );
            *poller = Some(runtime.spawn(poll_changes(
                self.path.clone(),
                self.poll_interval,
                self.tx.clone(),
            )));
        }
        Ok(rx)
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordSource {
    async fn load_for_write(&self) -> Result<Vec<Record>, SourceError> {
        match self.read_raw().await {
            Ok(raw) => self.parse(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(self.unavailable(e)),
        }
    }

    async fn replace_all(&self, records: Vec<Record>) -> Result<(), SourceError> {
        let write_err = |e: std::io::Error| {
            SourceError::unavailable(format!("failed to write {}: {}", self.path.display(), e))
        };

        tokio::fs::create_dir_all(self.watch_dir())
            .await
            .map_err(write_err)?;

        let body = serde_json::to_string_pretty(&records)
            .map_err(|e| SourceError::malformed(format!("failed to serialize records: {}", e)))?;

        // Readers never see a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(write_err)?;

        debug!(path = %self.path.display(), records = records.len(), "Records written");
        let _ = self.tx.send(ChangeEvent::new(ChangeOrigin::LocalWrite));
        Ok(())
    }
}

async fn fingerprint(path: &Path) -> Fingerprint {
    tokio::fs::metadata(path)
        .await
        .ok()
        .map(|meta| (meta.modified().ok(), meta.len()))
}

/// Poll the file until nobody is listening.
async fn poll_changes(path: PathBuf, interval: Duration, tx: broadcast::Sender<ChangeEvent>) {
    let mut last = fingerprint(&path).await;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if tx.receiver_count() == 0 {
            debug!(path = %path.display(), "No change subscribers left, stopping watcher");
            break;
        }
        let current = fingerprint(&path).await;
        if current != last {
            last = current;
            debug!(path = %path.display(), "Record file changed");
            let _ = tx.send(ChangeEvent::new(ChangeOrigin::Watcher));
        }
    }
}
