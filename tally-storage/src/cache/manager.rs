//! Aggregate cache manager.
//!
//! Holds at most one [`AggregateSnapshot`] and decides, per read, whether it
//! can be served or must be recomputed. Recomputes run as a single spawned
//! "flight" that every concurrent reader joins, so a burst of N reads costs
//! one source load.
//!
//! # Validity
//!
//! A snapshot is served without recompute when it exists, has not been
//! invalidated since it was computed, and is younger than the TTL.
//!
//! # Failure
//!
//! A failed recompute never replaces the current snapshot. Readers get the
//! previous snapshot (marked [`ReadOrigin::StaleFallback`]); on a cold cache
//! one shared on-demand load is attempted and its result returned without
//! being stored. Failures are not cached: the next read retries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tally_core::{compute, AggregateSnapshot, CacheError, Record, SourceError};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::config::CacheConfig;
use super::debounce::ChangeNotifier;
use super::metrics::{CacheMetrics, Counters};
use super::read::{ReadOrigin, StatsRead};
use crate::source::RecordSource;

type FlightOutcome = Result<Arc<AggregateSnapshot>, CacheError>;
type FlightReceiver = watch::Receiver<Option<FlightOutcome>>;
type FlightSender = watch::Sender<Option<FlightOutcome>>;

#[derive(Default)]
struct CacheState {
    current: Option<Arc<AggregateSnapshot>>,
    last_computed_at: Option<Instant>,
    /// Set by `invalidate`, cleared when a recompute lands.
    stale: bool,
    in_flight: Option<FlightReceiver>,
    /// A change arrived while a flight was loading; run once more.
    rerun: bool,
    /// Cold-cache fallback load. Joined like a flight, never stored.
    on_demand: Option<FlightReceiver>,
    last_error: Option<CacheError>,
}

struct CacheInner {
    source: Arc<dyn RecordSource>,
    config: CacheConfig,
    state: Mutex<CacheState>,
    counters: Counters,
    notifier: Mutex<Option<ChangeNotifier>>,
    watch_available: AtomicBool,
    shut_down: AtomicBool,
}

/// Cached aggregate over a [`RecordSource`].
///
/// Cheap to clone; clones share the snapshot and the change subscription.
#[derive(Clone)]
pub struct AggregateCache {
    inner: Arc<CacheInner>,
}

impl AggregateCache {
    /// Create a cache over `source` and subscribe to its changes.
    ///
    /// Change watching is best effort. When the source cannot be watched the
    /// cache still honors its TTL.
    pub fn new(source: Arc<dyn RecordSource>, config: CacheConfig) -> Self {
        let inner = Arc::new(CacheInner {
            source,
            config,
            state: Mutex::new(CacheState::default()),
            counters: Counters::default(),
            notifier: Mutex::new(None),
            watch_available: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        let notifier = ChangeNotifier::spawn(
            inner.source.as_ref(),
            inner.config.debounce_window,
            move || {
                if let Some(inner) = weak.upgrade() {
                    AggregateCache { inner }.invalidate();
                }
            },
        );
        inner
            .watch_available
            .store(notifier.is_active(), Ordering::SeqCst);
        *inner.notifier.lock().unwrap_or_else(|e| e.into_inner()) = Some(notifier);

        Self { inner }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn source(&self) -> &Arc<dyn RecordSource> {
        &self.inner.source
    }

    /// Return the aggregate, recomputing when the snapshot is missing,
    /// invalidated, expired, or `force_refresh` is set.
    ///
    /// Concurrent callers that need a recompute share one in-flight load.
    pub async fn get(&self, force_refresh: bool) -> Result<StatsRead, CacheError> {
        let flight = {
            let mut state = self.inner.lock_state()?;
            if !force_refresh {
                if let Some(read) = self.inner.valid_read(&state) {
                    Counters::bump(&self.inner.counters.hits);
                    return Ok(read);
                }
            }
            Counters::bump(&self.inner.counters.misses);
            self.inner.join_or_start(&mut state)?
        };

        match await_flight(flight).await {
            Ok(snapshot) => Ok(StatsRead::fresh(snapshot, ReadOrigin::Recomputed)),
            Err(err) => self.fallback(err).await,
        }
    }

    /// Recompute now and store the result. Used at startup.
    ///
    /// Unlike [`get`](Self::get) there is no fallback: the recompute outcome
    /// is returned as is.
    pub async fn warm(&self) -> Result<Arc<AggregateSnapshot>, CacheError> {
        let flight = {
            let mut state = self.inner.lock_state()?;
            self.inner.join_or_start(&mut state)?
        };
        await_flight(flight).await
    }

    /// Mark the snapshot stale and start a background recompute.
    ///
    /// Never blocks and never fails. If a recompute is already loading, one
    /// more is queued behind it so the stored snapshot reflects this change.
    pub fn invalidate(&self) {
        Counters::bump(&self.inner.counters.invalidations);
        let mut state = match self.inner.lock_state() {
            Ok(state) => state,
            Err(err) => {
                error!(error = %err, "Invalidation dropped");
                return;
            }
        };
        state.stale = true;

        if state.in_flight.is_some() {
            if !state.rerun {
                debug!("Recompute in flight, queueing another after it");
            }
            state.rerun = true;
            return;
        }

        if let Err(err) = self.inner.start_flight(&mut state) {
            warn!(error = %err, "Background recompute not started, next read will recompute");
            state.last_error = Some(err);
        }
    }

    /// Current snapshot without triggering a recompute, regardless of
    /// validity.
    pub fn peek(&self) -> Option<Arc<AggregateSnapshot>> {
        self.inner
            .lock_state()
            .ok()
            .and_then(|state| state.current.clone())
    }

    /// Whether the next non-forced read would be a hit.
    pub fn is_valid(&self) -> bool {
        self.inner
            .lock_state()
            .map(|state| self.inner.valid_read(&state).is_some())
            .unwrap_or(false)
    }

    pub fn watch_available(&self) -> bool {
        self.inner.watch_available.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> CacheMetrics {
        let counters = &self.inner.counters;
        let (has_snapshot, last_error) = match self.inner.lock_state() {
            Ok(state) => (
                state.current.is_some(),
                state.last_error.as_ref().map(|e| e.to_string()),
            ),
            Err(err) => (false, Some(err.to_string())),
        };
        CacheMetrics {
            hits: Counters::read(&counters.hits),
            misses: Counters::read(&counters.misses),
            recomputations: Counters::read(&counters.recomputations),
            coalesced: Counters::read(&counters.coalesced),
            failures: Counters::read(&counters.failures),
            stale_served: Counters::read(&counters.stale_served),
            invalidations: Counters::read(&counters.invalidations),
            watch_available: self.watch_available(),
            has_snapshot,
            last_error,
        }
    }

    /// Stop change notification. Any armed debounce timer is cancelled.
    /// Idempotent; reads keep working on TTL expiry afterwards.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(notifier) = self
            .inner
            .notifier
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            notifier.shutdown();
        }
        self.inner.watch_available.store(false, Ordering::SeqCst);
        info!("Aggregate cache shut down");
    }

    async fn fallback(&self, err: CacheError) -> Result<StatsRead, CacheError> {
        let previous = self.inner.lock_state().ok().and_then(|state| {
            state
                .current
                .clone()
                .zip(state.last_computed_at)
        });

        if let Some((snapshot, computed_at)) = previous {
            Counters::bump(&self.inner.counters.stale_served);
            warn!(error = %err, "Recompute failed, serving previous snapshot");
            return Ok(StatsRead::new(
                snapshot,
                computed_at.elapsed(),
                ReadOrigin::StaleFallback,
            ));
        }

        let flight = {
            let mut state = self.inner.lock_state()?;
            match &state.on_demand {
                Some(flight) => {
                    Counters::bump(&self.inner.counters.coalesced);
                    flight.clone()
                }
                None => {
                    warn!(error = %err, "Recompute failed with no snapshot, loading on demand");
                    self.inner.start_on_demand(&mut state)?
                }
            }
        };
        let snapshot = await_flight(flight).await?;
        Ok(StatsRead::fresh(snapshot, ReadOrigin::OnDemand))
    }
}

impl CacheInner {
    fn lock_state(&self) -> Result<MutexGuard<'_, CacheState>, CacheError> {
        self.state.lock().map_err(|_| CacheError::LockPoisoned)
    }

    fn valid_read(&self, state: &CacheState) -> Option<StatsRead> {
        if state.stale {
            return None;
        }
        let snapshot = state.current.as_ref()?;
        let age = state.last_computed_at?.elapsed();
        (age < self.config.ttl).then(|| StatsRead::new(Arc::clone(snapshot), age, ReadOrigin::Cache))
    }

    fn join_or_start(self: &Arc<Self>, state: &mut CacheState) -> Result<FlightReceiver, CacheError> {
        match &state.in_flight {
            Some(flight) => {
                Counters::bump(&self.counters.coalesced);
                Ok(flight.clone())
            }
            None => self.start_flight(state),
        }
    }

    fn start_flight(self: &Arc<Self>, state: &mut CacheState) -> Result<FlightReceiver, CacheError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| CacheError::RecomputeAborted)?;
        let (tx, rx) = watch::channel(None);
        state.in_flight = Some(rx.clone());
        runtime.spawn(Arc::clone(self).run_flight(tx));
        Ok(rx)
    }

    fn start_on_demand(self: &Arc<Self>, state: &mut CacheState) -> Result<FlightReceiver, CacheError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| CacheError::RecomputeAborted)?;
        let (tx, rx) = watch::channel(None);
        state.on_demand = Some(rx.clone());
        runtime.spawn(Arc::clone(self).run_on_demand(tx));
        Ok(rx)
    }

    async fn run_on_demand(self: Arc<Self>, tx: FlightSender) {
        let guard = FlightGuard {
            inner: self.as_ref(),
            reset: clear_on_demand,
            finished: false,
        };
        let outcome = match self.load().await {
            Ok(records) => Ok(Arc::new(compute(&records))),
            Err(e) => {
                error!(error = %e, "On-demand load failed");
                Err(CacheError::from(e))
            }
        };
        // Vacate the slot before publishing; the result is never stored.
        drop(guard);
        tx.send_replace(Some(outcome));
    }

    async fn run_flight(self: Arc<Self>, mut tx: FlightSender) {
        let mut guard = FlightGuard {
            inner: self.as_ref(),
            reset: clear_in_flight,
            finished: false,
        };

        loop {
            let outcome = self.recompute().await;

            let next = {
                let mut state = match self.lock_state() {
                    Ok(state) => state,
                    Err(err) => {
                        tx.send_replace(Some(Err(err)));
                        return;
                    }
                };
                self.apply(&mut state, &outcome);
                if state.rerun {
                    state.rerun = false;
                    let (next_tx, next_rx) = watch::channel(None);
                    state.in_flight = Some(next_rx);
                    Some(next_tx)
                } else {
                    state.in_flight = None;
                    None
                }
            };

            tx.send_replace(Some(outcome));
            match next {
                Some(next_tx) => {
                    debug!("Running queued recompute");
                    tx = next_tx;
                }
                None => break,
            }
        }
        guard.finished = true;
    }

    async fn recompute(&self) -> FlightOutcome {
        Counters::bump(&self.counters.recomputations);
        let started = Instant::now();
        let records = self.load().await?;
        let snapshot = compute(&records);
        info!(
            total = snapshot.total,
            total_value = snapshot.total_value,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Aggregate recomputed"
        );
        Ok(Arc::new(snapshot))
    }

    async fn load(&self) -> Result<Vec<Record>, SourceError> {
        match self.config.load_timeout {
            Some(limit) => tokio::time::timeout(limit, self.source.load_all())
                .await
                .map_err(|_| SourceError::timed_out(limit))?,
            None => self.source.load_all().await,
        }
    }

    fn apply(&self, state: &mut CacheState, outcome: &FlightOutcome) {
        match outcome {
            Ok(snapshot) => {
                state.current = Some(Arc::clone(snapshot));
                state.last_computed_at = Some(Instant::now());
                // A queued rerun means a change landed after this load began.
                state.stale = state.rerun;
                state.last_error = None;
            }
            Err(err) => {
                Counters::bump(&self.counters.failures);
                error!(error = %err, "Aggregate recompute failed");
                state.last_error = Some(err.clone());
            }
        }
    }
}

/// Clears a flight slot when its task ends without finishing normally,
/// so later reads start a new flight instead of joining a dead one.
struct FlightGuard<'a> {
    inner: &'a CacheInner,
    reset: fn(&mut CacheState),
    finished: bool,
}

fn clear_in_flight(state: &mut CacheState) {
    state.in_flight = None;
    state.rerun = false;
}

fn clear_on_demand(state: &mut CacheState) {
    state.on_demand = None;
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        (self.reset)(&mut state);
    }
}

async fn await_flight(mut flight: FlightReceiver) -> FlightOutcome {
    let settled = flight
        .wait_for(Option::is_some)
        .await
        .map(|outcome| (*outcome).clone());
    match settled {
        Ok(Some(outcome)) => outcome,
        // Sender dropped without publishing: the flight task was cancelled.
        Ok(None) | Err(_) => Err(CacheError::RecomputeAborted),
    }
}
